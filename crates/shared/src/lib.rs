//! Shared types for the hubline chat client: wire protocol frames,
//! push-event catalogue, domain models and the error taxonomy.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
