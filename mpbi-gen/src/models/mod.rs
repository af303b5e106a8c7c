//! Data models for mpbi-gen
//!
//! - Generation criteria and their validation
//! - Generation jobs (persisted progress of one run)
//! - MemberPress transaction rows

pub mod criteria;
pub mod job;
pub mod transaction;

pub use criteria::{CriteriaError, GenerationCriteria, GenerationMode, ResolvedCriteria, TransactionStatus};
pub use job::{BatchOutcome, GenerationJob, ProgressSnapshot};
pub use transaction::{Transaction, TransactionStats};
