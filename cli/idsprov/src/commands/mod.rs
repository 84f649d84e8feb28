//! CLI command implementations.

pub mod artifact;
pub mod image;
pub mod init;
pub mod negotiate;
pub mod provision;
