// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::config::{Mode, PipelineConfig};
pub use crate::error::{Error, FetchError, FieldExtractionError, Result, XmlParseError};
pub use crate::ingest::types::{FeedEntry, Point, SeismicEvent};
pub use crate::ingest::window::TimeWindow;
pub use crate::ingest::{Orchestrator, RunState, RunSummary, Stage};
