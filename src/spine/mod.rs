//! Spine ingestion: the append-only event log that is the router's only input.

pub mod event;
pub mod reader;

pub use event::{EventKind, ParseError, SpineEvent};
pub use reader::{ReaderStats, SpineReader, SpineTail};
