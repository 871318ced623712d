//! Sluice - Data Model
//!
//! Shared types that flow between the pipeline stages:
//!
//! - [`EnrichedEvent`] - the canonical flat event, serialized to
//!   tab-separated UTF-8 for the good and pii outputs
//! - [`BadRow`] - a structured failure record, serialized to a single
//!   compact JSON line for the bad output
//! - [`CollectorPayload`] - the decoded form of a raw collector record,
//!   produced by a [`PayloadDecoder`]
//! - [`AttributedData`] - bytes plus a partition-key attribute, the unit
//!   the sinks publish
//! - frame encoding shared by the file/tcp transports
//!
//! Every other crate in the workspace depends on this one; it depends on
//! nothing in the workspace.

mod attributed;
mod bad_row;
mod event;
mod frame;
mod payload;

pub use attributed::AttributedData;
pub use bad_row::{BadRow, BadRowKind, Processor};
pub use event::EnrichedEvent;
pub use frame::{encode_frame, Frame, FrameDecoder, FrameError, MAX_FRAME_BYTES};
pub use payload::{CollectorPayload, DecodeFailure, JsonPayloadDecoder, PayloadDecoder};

/// One element of a dispatch result: an event that survived the chain, or
/// the failure record that replaced it.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Successfully enriched event, headed for the good output.
    Good(Box<EnrichedEvent>),
    /// Failure record, headed for the bad output.
    Bad(BadRow),
}

impl Outcome {
    /// True if this outcome carries an enriched event.
    pub fn is_good(&self) -> bool {
        matches!(self, Outcome::Good(_))
    }

    /// True if this outcome carries a bad row.
    pub fn is_bad(&self) -> bool {
        matches!(self, Outcome::Bad(_))
    }
}
