//! dataqna core types
//!
//! Value types, audit records, error enums and the collaborator traits that the
//! SQL generation pipeline is written against. Concrete stores, backends and
//! model clients live in the other workspace crates.

pub mod audit;
pub mod error;
pub mod traits;
mod types;

pub use audit::{AuditEntry, Stage, StageEvent};
pub use error::{AgentError, ExecError, StoreError};
pub use traits::*;
pub use types::*;
