//! Stack plans
//!
//! This module handles plan configuration, dependency ordering, and
//! execution.

pub mod config;
pub mod executor;
pub mod graph;
pub mod status;
