pub mod admin;
pub mod payments;
pub mod worker;

pub use admin::{AdminContext, AdminService, ForceResolveTarget, ReconciliationOutcome};
pub use payments::{
    BuildPayoutOutcome, CreatePayoutRequest, PaymentService, PayoutMode, SubmitOutcome,
};
pub use worker::{BatchOutcome, PaymentWorker};
