//! Raw source extraction
//!
//! Each source fetches one payload from an external API and reshapes it into
//! a [`RecordBatch`](marketflow_core::RecordBatch) for the raw loading phase:
//! - `fixer` - daily currency exchange rates
//! - `market_stack` - end-of-day stock prices
//! - `static_source` - a fixed batch, for tests and local runs

pub mod client;
pub mod source;
pub mod fixer;
pub mod market_stack;
pub mod static_source;

pub use client::{ApiClient, SourceError};
pub use source::{build_source, Source};
pub use fixer::FixerSource;
pub use market_stack::MarketStackSource;
pub use static_source::StaticSource;
