//! Purchase and sale processing.
//!
//! [`OrderProcessor`] validates a request with the line-item aggregator,
//! persists the resulting order and adjusts stock for every line, all in one
//! store transaction:
//!
//! 1. Aggregate the request lines into a priced draft
//! 2. Save the order header and lines
//! 3. Adjust stock per line, in line order
//!
//! If any step fails, nothing is committed.

pub mod config;
pub mod error;
pub mod processor;

pub use config::ProcessorConfig;
pub use error::{ProcessError, Result, Stage};
pub use processor::{OrderProcessor, ProcessedOrder};
