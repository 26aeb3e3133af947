//! Session orchestration modules.
//!
//! Covers session lifecycle management, report synthesis, the per-handoff
//! reconciliation loop, and the session event surface.

pub mod events;
pub mod reconciler;
pub mod session_manager;
pub mod synthesizer;
