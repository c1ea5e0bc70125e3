//! keyspace-core: shared types, configuration schema, and error taxonomy for
//! the Keyspace client.

pub mod config;
pub mod error;
pub mod types;

pub use error::{KeyspaceError, KeyspaceResult};
