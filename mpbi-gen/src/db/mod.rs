//! Database access for mpbi-gen
//!
//! - `transactions`: read-only queries against the MemberPress tables
//! - `jobs`: generation job persistence in the service's own table

pub mod jobs;
pub mod transactions;
