//! Sluice - Sinks
//!
//! Batched, retrying, partition-keyed publication of byte records.
//!
//! # Architecture
//!
//! ```text
//! publish() ──→ bounded channel ──→ [batcher task] ──→ StreamProducer
//!    (blocks when full:                 │ flush on count / bytes / age
//!     the system's                      │ retry failed subsets with
//!     back-pressure point)              ▼ capped exponential backoff
//!                                    tcp | file | stdout | memory
//! ```
//!
//! A [`Sink`] is constructed once per output (good, pii, bad) from an
//! `OutputConfig`. `publish` completes when the record is accepted into
//! the internal buffer - that acceptance is what the pipeline's ack
//! barrier waits for; durable delivery is the batcher's job and is
//! guaranteed by `close`, which drains the buffer with the same retry
//! policy before returning.

mod error;
mod file;
mod memory;
mod producer;
mod sink;
mod stdout;
mod tcp;

pub use error::SinkError;
pub use file::FileProducer;
pub use memory::{FailureMode, MemoryProducer};
pub use producer::{BatchResponse, OutboundRecord, ProducerError, StreamProducer};
pub use sink::{Sink, SinkMetricsSnapshot};
pub use stdout::StdoutProducer;
pub use tcp::TcpProducer;
