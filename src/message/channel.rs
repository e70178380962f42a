//! An in-process communicator connecting the ranks of one collective
//! through unbounded channels.
//!
//! Every endpoint lives in the same process, which makes multi-rank
//! protocol runs deterministic: nothing blocks, so a single thread can
//! drive several ranks by alternating their `progress()` calls. This is
//! the transport the test suite uses.

use super::comm::{CommError, Communicator, RecvHandle, SendHandle, Tag};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

type Packet = (usize, Tag, Vec<u8>);

pub struct ChannelCommunicator {
    rank: usize,
    peers: Vec<Sender<Packet>>,
    inbox: Receiver<Packet>,
    undelivered: Vec<Packet>,
    next_send: u64,
}

impl ChannelCommunicator {
    /// Creates `size` connected endpoints, one per rank, in rank order.
    pub fn bus(size: usize) -> Vec<ChannelCommunicator> {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..size).map(|_| unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ChannelCommunicator {
                rank,
                peers: senders.clone(),
                inbox,
                undelivered: Vec::new(),
                next_send: 0,
            })
            .collect()
    }

    /// Moves every arrived packet into the undelivered list, preserving
    /// arrival order. Reports whether the inbox can never fill again.
    fn drain(&mut self) -> bool {
        loop {
            match self.inbox.try_recv() {
                Ok(packet) => self.undelivered.push(packet),
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn start_send(
        &mut self,
        peer: usize,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<SendHandle, CommError> {
        self.peers[peer]
            .send((self.rank, tag, payload))
            .map_err(|_| CommError::Disconnected(peer))?;
        let handle = SendHandle(self.next_send);
        self.next_send += 1;
        Ok(handle)
    }

    fn test_send(&mut self, _handle: &SendHandle) -> Result<bool, CommError> {
        // hand-off into an unbounded channel is delivery
        Ok(true)
    }

    fn start_recv(&mut self, peer: usize, tag: Tag) -> Result<RecvHandle, CommError> {
        Ok(RecvHandle { peer, tag })
    }

    fn test_recv(&mut self, handle: &RecvHandle) -> Result<Option<Vec<u8>>, CommError> {
        let disconnected = self.drain();
        let found = self
            .undelivered
            .iter()
            .position(|(src, tag, _)| *src == handle.peer && *tag == handle.tag);
        match found {
            Some(index) => Ok(Some(self.undelivered.remove(index).2)),
            None if disconnected => Err(CommError::Disconnected(handle.peer)),
            None => Ok(None),
        }
    }
}
