//! Specialist-review platform boundary.
//!
//! [`client`] carries the wire contract and the reqwest implementation;
//! [`handoff`] layers idempotent submission and status mapping on top.

pub mod client;
pub mod handoff;

pub use client::{HttpPlatformClient, PlatformApi, ReportSubmission, StatusSnapshot, SubmitReceipt};
pub use handoff::HandoffClient;
