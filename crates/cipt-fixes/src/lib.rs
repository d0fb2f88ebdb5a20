//! Re-runnable data corrections for an existing cipt database.

pub mod calendar;
pub mod final_installment;
pub mod harness;
pub mod unify_status;

pub use final_installment::{FinalInstallmentOptions, FinalInstallmentReport, InstallmentPlan};
pub use harness::{Target, with_target};
pub use unify_status::{UnifyStatusOptions, UnifyStatusReport};
