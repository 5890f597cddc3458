//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&DbPool` as the first argument.

pub mod ai_decision_repo;
pub mod history_repo;
pub mod notification_repo;
pub mod pending_repo;
pub mod reconciliation_repo;
pub mod setting_repo;

pub use ai_decision_repo::AiDecisionRepo;
pub use history_repo::HistoryRepo;
pub use notification_repo::NotificationRepo;
pub use pending_repo::PendingRepo;
pub use reconciliation_repo::ReconciliationRepo;
pub use setting_repo::SettingRepo;
