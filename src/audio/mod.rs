//! Canonical audio types and codec facade (C1 + C2).

pub mod codec;
pub mod constants;
pub mod types;

pub use types::{AudioSegment, CanonicalFrame, ProcessedSegment, ProcessingStatus, WordTiming};
