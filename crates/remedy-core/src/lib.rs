//! Data model and error taxonomy shared by every remedy-iq-core crate.
//!
//! No I/O lives here: this crate defines `LogEntry`/`LogType` ( of the
//! spec) and the tenant-id validation guard, and nothing else.

pub mod error;
pub mod model;
pub mod tenant;

pub use error::CoreError;
pub use model::{LogEntry, LogType};
pub use tenant::validate_tenant_id;
