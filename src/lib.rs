#![forbid(unsafe_code)]

//! Automatic reviewer for Teleport access requests.
//!
//! Watches pending access requests, evaluates them against ordered
//! rejection rules, and denies the ones that violate policy. Requests no
//! rule triggers on are left untouched for a human reviewer.

pub mod config;
pub mod errors;
pub mod health;
pub mod identity;
pub mod models;
pub mod plane;
pub mod policy;
pub mod reviewer;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
