//! Emission side: structural dedup and the append-only intent log.

pub mod dedup;
pub mod intent_log;

pub use dedup::Deduplicator;
pub use intent_log::{IntentLog, IntentPayload, IntentRecord, INTENT_EVENT_TYPE};
