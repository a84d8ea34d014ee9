//! # hermes-transfer
//!
//! Delegates file transfer to rclone and runs whole projects against it.
//!
//! [`RcloneClient`] performs one (source, remote) transfer; [`ProjectRunner`]
//! walks every remote × source pair of a project in declared order and stops
//! at the first failure.

pub mod client;
pub mod error;
pub mod runner;

pub use client::{RcloneClient, TransferClient, TransferRequest};
pub use error::{RunError, TransferError};
pub use runner::{ProjectRunner, RunReport};
