//! Database bootstrap and shared table access

pub mod init;
pub mod operators;
pub mod settings;

pub use init::*;
pub use operators::*;
pub use settings::*;
