//! Deterministic regime router.
//!
//! Consumes an append-only event spine, folds it into a small state
//! projection, applies hard vetoes and emits deduplicated posture records.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Spine Reader │────►│   Reducer    │────►│ Constraints  │
//! │  (ordered)   │     │  (pure fn)   │     │ + Posture tbl│
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                      ┌──────────────┐     ┌──────────────┐
//!                      │  Intent Log  │◄────│    Dedup     │
//!                      │ (append-only)│     │ (per symbol) │
//!                      └──────────────┘     └──────────────┘
//! ```
//!
//! Replay and tail modes share the same per-event path, so a tailing
//! process and a one-shot replay over the same prefix write identical bytes.

pub mod config;
pub mod engine;
pub mod logging;
pub mod output;
pub mod runtime;
pub mod spine;
