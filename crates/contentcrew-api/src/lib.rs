//! HTTP surface for ContentCrew: article generation jobs, SSE status polling,
//! article and draft reads, and feedback-driven revisions.

pub mod config;
pub mod error;
mod metrics;
pub mod routes;
pub mod state;
