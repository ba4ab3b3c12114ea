//! Identity material and the connection lifecycle built on it.

pub mod credential;
pub mod manager;
