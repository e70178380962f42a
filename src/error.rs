//! Error taxonomy of the mesh subsystem.
//!
//! Failures surface as values and propagate to the transport driver,
//! which is the only layer that decides to abort; the mesh never catches
//! a communication failure itself. The one recoverable kind is
//! [`MeshError::NotResident`], which contracts the caller to queue a
//! request and retry after the next `progress()` cycle.

use crate::message::{CommError, Tag};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    /// The element lives on another rank and is not in the remote cache.
    /// Recoverable: request it and retry after `progress()`.
    #[error("element {0} is not resident; request it and retry after progress()")]
    NotResident(u32),

    /// A global id outside the problem. Programmer error.
    #[error("global id {id} outside the problem range [0, {n_global})")]
    IdOutOfRange { id: u32, n_global: u32 },

    /// The transport failed underneath a non-blocking operation. Fatal.
    #[error("communication with peer {peer} on {tag:?} failed")]
    Comm {
        peer: usize,
        tag: Tag,
        #[source]
        source: CommError,
    },

    /// A peer sent a payload that does not decode. Fatal.
    #[error("invalid {tag:?} payload from peer {peer}: {reason}")]
    Payload {
        peer: usize,
        tag: Tag,
        reason: String,
    },
}

impl MeshError {
    /// True for the one failure the caller is expected to recover from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MeshError::NotResident(_))
    }
}
