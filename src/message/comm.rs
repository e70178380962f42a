//! The non-blocking point-to-point messaging contract.
//!
//! The mesh reaches the collective runtime only through the
//! [`Communicator`] trait: tagged sends and receives of byte buffers,
//! started without blocking and polled for completion. Implementors must
//! deliver messages between a fixed (sender, receiver) pair with a fixed
//! tag in order; the request engine keeps at most one operation per tag
//! per peer in flight and relies on that. No ordering is assumed across
//! different peers or tags.

use thiserror::Error;

/// Message classes exchanged by the mesh protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// An ordered list of peer-local element indices the sender wants.
    CellId,
    /// Wire-encoded elements answering the sender's last `CellId` list.
    Cell,
}

impl Tag {
    pub fn to_wire(self) -> u32 {
        match self {
            Tag::CellId => 0,
            Tag::Cell => 1,
        }
    }

    pub fn from_wire(tag: u32) -> Option<Tag> {
        match tag {
            0 => Some(Tag::CellId),
            1 => Some(Tag::Cell),
            _ => None,
        }
    }
}

/// Raised when the transport under a non-blocking operation fails. This
/// is fatal to the rank: the mesh reports it upward and never retries.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("peer {0} disconnected")]
    Disconnected(usize),
}

/// Handle on an in-flight non-blocking send. Poll it with
/// [`Communicator::test_send`] until completion, then discard it;
/// dropping a handle abandons interest without cancelling delivery.
#[derive(Debug)]
pub struct SendHandle(pub u64);

/// Handle on a posted non-blocking receive for the next message from one
/// peer carrying one tag.
#[derive(Debug)]
pub struct RecvHandle {
    pub peer: usize,
    pub tag: Tag,
}

pub trait Communicator {
    /// The identity of this rank within the collective.
    fn rank(&self) -> usize;

    /// The number of ranks in the collective.
    fn size(&self) -> usize;

    /// Starts a non-blocking send. The payload moves into the transport,
    /// which owns it until delivery.
    fn start_send(
        &mut self,
        peer: usize,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<SendHandle, CommError>;

    /// Polls a send, reporting `true` once the payload has been handed
    /// off to the transport for delivery.
    fn test_send(&mut self, handle: &SendHandle) -> Result<bool, CommError>;

    /// Posts a non-blocking receive for the next message from `peer`
    /// carrying `tag`.
    fn start_recv(&mut self, peer: usize, tag: Tag) -> Result<RecvHandle, CommError>;

    /// Polls a posted receive, yielding the payload once the matching
    /// message has arrived. Never blocks.
    fn test_recv(&mut self, handle: &RecvHandle) -> Result<Option<Vec<u8>>, CommError>;
}
