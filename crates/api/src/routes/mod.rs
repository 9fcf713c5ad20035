//! HTTP route handlers

pub mod control;
pub mod status;
