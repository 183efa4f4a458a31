//! Recruitment pipeline engine: stage ledger, AI evaluation runs, and weighted scoring.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
