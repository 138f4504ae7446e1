mod audit;
mod consent;

pub use audit::{AuditCommands, AuditFilterArgs};
pub use consent::ConsentCommands;
