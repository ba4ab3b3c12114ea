//! Domain model module declarations.

pub mod event;
pub mod health;
pub mod request;
pub mod rule;
