pub mod aggregator;
pub mod error;
mod pipeline;
pub mod pulses;
pub mod sink;

pub use aggregator::{Aggregation, MemoryAggregator};
pub use error::StreamError;
pub use pipeline::{DEFAULT_FLUSH_INTERVAL, Options, start};
pub use pulses::{AggregateRecord, GroupedRecord, PulseAggregation};
pub use sink::{RecordSink, StreamSink};
