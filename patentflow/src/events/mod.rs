//! Progress event delivery.
//!
//! The coordinator and its workers write to an `Arc<dyn ProgressSink>`. In a
//! bridged run that sink is a [`RelaySink`] feeding the caller's iterator.

mod relay;
mod sink;

pub use relay::{relay, RelayMetrics, RelaySink};
pub use sink::{CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressSink};
