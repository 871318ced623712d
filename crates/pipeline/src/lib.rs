//! Sluice - Pipeline Runtime
//!
//! Wires the whole system together and owns its lifecycle:
//!
//! ```text
//! [Source] ──→ intake channel ──→ [feeder] ──→ worker shards (N=64)
//!                                   │ pause gate + raw_count + seq    │
//!                                   ▼                                 ▼
//!                              [asset refresh]              [enrich workers]
//!                              [metrics reporter]                    │
//!                                                                    ▼
//!                                              [output gate: reorder? → fan-out → ack]
//!                                                       │ good / pii / bad sinks
//! ```
//!
//! # Key guarantees
//!
//! - **One ack per record**, issued only after every derived row has been
//!   accepted by its sink
//! - **Bounded everything**: all channels are bounded and sends block, so
//!   back-pressure propagates from the sinks to the source
//! - **Coherent enrichment**: records enter the enrich stage through the
//!   pause gate, so an asset swap never tears a chain mid-record
//! - **No silent loss**: a bad row that cannot be sunk stops the pipeline
//!
//! # Shutdown choreography
//!
//! Cancellation stops the source; in-flight enrich calls finish; the
//! sinks flush and close; pending acks drain; each step bounded by the
//! configured shutdown timeout.

mod error;
mod reorder;
mod runtime;

pub use error::PipelineError;
pub use reorder::ReorderBuffer;
pub use runtime::{PipelineRuntime, PipelineSinks};
