//! Core domain types and logic.

pub mod backfill;
pub mod benchmark;
pub mod changes;
pub mod classifier;
pub mod config_validation;
pub mod error;
pub mod membership;
pub mod merge;
pub mod nav;
pub mod price;
pub mod rules;
pub mod run_config;
pub mod schedule;
pub mod security;
pub mod universe;
