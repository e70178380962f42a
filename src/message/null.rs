//! Provides a message-passing communicator that does nothing.
//!
//! Useful for single-rank runs and for testing: a one-rank collective
//! has no peers, so the request engine never touches the transport.

use super::comm::{CommError, Communicator, RecvHandle, SendHandle, Tag};

/// A message-passing communicator that does nothing. The `rank` and
/// `size` members are functioning but every transfer is `unimplemented`.
pub struct NullCommunicator {}

impl NullCommunicator {
    pub fn new() -> Self {
        Self {}
    }
}

impl Communicator for NullCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn start_send(
        &mut self,
        _peer: usize,
        _tag: Tag,
        _payload: Vec<u8>,
    ) -> Result<SendHandle, CommError> {
        unimplemented!("cannot send on a null communicator")
    }

    fn test_send(&mut self, _handle: &SendHandle) -> Result<bool, CommError> {
        unimplemented!("cannot send on a null communicator")
    }

    fn start_recv(&mut self, _peer: usize, _tag: Tag) -> Result<RecvHandle, CommError> {
        unimplemented!("cannot recv on a null communicator")
    }

    fn test_recv(&mut self, _handle: &RecvHandle) -> Result<Option<Vec<u8>>, CommError> {
        unimplemented!("cannot recv on a null communicator")
    }
}

impl Default for NullCommunicator {
    fn default() -> Self {
        Self::new()
    }
}
