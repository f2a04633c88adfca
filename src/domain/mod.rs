pub mod admin;
pub mod transaction;

pub use admin::{
    AuditFilter, AuditLogEntry, AuditLogRecord, AuditOutcome, ConfirmationToken,
    NewConfirmationToken,
};
pub use transaction::{Asset, PayoutStatus, TransactionRecord};
