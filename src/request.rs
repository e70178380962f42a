//! The per-peer state machines that fetch off-rank elements.
//!
//! One engine exists per rank, with one slot per peer, and it only ever
//! moves when the driver calls [`RequestEngine::progress`]: the whole
//! protocol is cooperative and nothing in it blocks. Two independent
//! half-duplex exchanges run concurrently against every peer. On the
//! outbound side, ids staged by [`RequestEngine::stage`] are shipped as
//! a CELL_ID list and the CELL reply is filed into the remote cache. On
//! the inbound side, a CELL_ID receive stays posted; when a peer's list
//! arrives, the matching elements are gathered from the local window and
//! shipped back as a CELL message. At most one operation per tag is in
//! flight toward a peer at any time, so the transport's per-(peer, tag)
//! ordering pairs every reply with the oldest outstanding request.

use crate::element::{decode_elements, Element, WIRE_SIZE};
use crate::error::MeshError;
use crate::message::{util, CommError, Communicator, RecvHandle, SendHandle, Tag};
use crate::partition::PartitionMap;
use crate::remote_cache::RemoteCache;
use log::trace;
use std::mem;

/// Communication state against one peer. The four optional handles are
/// the four independent non-blocking operations the protocol keeps at
/// most one each of in flight: the outbound id list, the element reply
/// it expects, the peer's inbound id list, and the element send
/// answering it.
#[derive(Default)]
struct PeerSlot {
    /// This rank has ids to fetch from the peer.
    need_data: bool,
    /// The peer has asked for ids; this rank owes it elements.
    send_data: bool,
    /// Peer-local ids staged since the last dispatch.
    staged_ids: Vec<u32>,
    /// The dispatched snapshot, held until the reply lands and never
    /// reused across dispatches.
    sent_ids: Vec<u32>,
    /// Ids the peer asked for, backing the element send.
    serve_ids: Vec<u32>,
    id_send: Option<SendHandle>,
    elem_recv: Option<RecvHandle>,
    id_recv: Option<RecvHandle>,
    elem_send: Option<SendHandle>,
}

/// Drives the id-for-elements exchanges against every peer.
pub struct RequestEngine {
    slots: Vec<PeerSlot>,
    off_rank_reads: u32,
}

impl RequestEngine {
    /// One slot per peer; the slots live for the whole run.
    pub fn new(n_peer: usize) -> Self {
        Self {
            slots: (0..n_peer).map(|_| PeerSlot::default()).collect(),
            off_rank_reads: 0,
        }
    }

    /// Admits one peer-local id for fetching from `peer`. Every admitted
    /// id counts one off-rank read; duplicate suppression happens in the
    /// remote cache before admission.
    pub fn stage(&mut self, peer: usize, peer_local: u32) {
        let slot = &mut self.slots[peer];
        slot.staged_ids.push(peer_local);
        slot.need_data = true;
        self.off_rank_reads += 1;
    }

    /// Number of admitted off-rank requests since the last call; resets
    /// the counter.
    pub fn take_off_rank_reads(&mut self) -> u32 {
        mem::replace(&mut self.off_rank_reads, 0)
    }

    /// Admitted off-rank requests since the counter was last taken.
    pub fn off_rank_reads(&self) -> u32 {
        self.off_rank_reads
    }

    /// True when no fetch or service exchange is mid-flight. The
    /// standing CELL_ID receives posted toward every peer do not count;
    /// they persist across steps.
    pub fn is_quiescent(&self) -> bool {
        self.slots.iter().all(|s| {
            !s.need_data
                && !s.send_data
                && s.id_send.is_none()
                && s.elem_recv.is_none()
                && s.elem_send.is_none()
        })
    }

    /// Advances every peer state machine one cooperative step. Returns
    /// whether any new remote element became resident during this call,
    /// which tells the driver to retry queued transport work.
    pub fn progress<C: Communicator>(
        &mut self,
        comm: &mut C,
        partition: &PartitionMap,
        window: &[Element],
        cache: &mut RemoteCache,
    ) -> Result<bool, MeshError> {
        let mut new_data = false;
        for peer in 0..self.slots.len() {
            let rank = partition.rank_of_peer(peer);
            let slot = &mut self.slots[peer];
            new_data |= Self::advance_fetch(slot, comm, rank, cache)?;
            Self::advance_service(slot, comm, rank, window)?;
        }
        Ok(new_data)
    }

    /// Outbound side: ship the staged id list, await the element reply,
    /// and file the received elements into the cache.
    fn advance_fetch<C: Communicator>(
        slot: &mut PeerSlot,
        comm: &mut C,
        rank: usize,
        cache: &mut RemoteCache,
    ) -> Result<bool, MeshError> {
        if !slot.need_data {
            return Ok(false);
        }
        if slot.id_send.is_none() {
            slot.sent_ids = mem::take(&mut slot.staged_ids);
            let payload = util::encode_ids(&slot.sent_ids);
            trace!("requesting {} elements from rank {}", slot.sent_ids.len(), rank);
            slot.id_send = Some(
                comm.start_send(rank, Tag::CellId, payload)
                    .map_err(|e| comm_fatal(rank, Tag::CellId, e))?,
            );
        }
        if slot.elem_recv.is_none() {
            slot.elem_recv = Some(
                comm.start_recv(rank, Tag::Cell)
                    .map_err(|e| comm_fatal(rank, Tag::Cell, e))?,
            );
            return Ok(false);
        }
        let reply = match &slot.elem_recv {
            Some(handle) => comm
                .test_recv(handle)
                .map_err(|e| comm_fatal(rank, Tag::Cell, e))?,
            None => None,
        };
        let bytes = match reply {
            Some(bytes) => bytes,
            None => return Ok(false),
        };
        // The reply pairs with the oldest outstanding id list, so the id
        // send is spent and its handle retires with it.
        slot.id_send = None;
        slot.elem_recv = None;
        slot.sent_ids.clear();
        if slot.staged_ids.is_empty() {
            slot.need_data = false;
        }
        let elems = decode_elements(&bytes).map_err(|e| MeshError::Payload {
            peer: rank,
            tag: Tag::Cell,
            reason: e.to_string(),
        })?;
        trace!("received {} elements from rank {}", elems.len(), rank);
        for elem in elems {
            if let Some(victim) = cache.insert(elem) {
                trace!("cache full: evicted element {}", victim);
            }
        }
        Ok(true)
    }

    /// Inbound side: keep an id receive posted, build the element reply
    /// from the local window, and ship it.
    fn advance_service<C: Communicator>(
        slot: &mut PeerSlot,
        comm: &mut C,
        rank: usize,
        window: &[Element],
    ) -> Result<(), MeshError> {
        if slot.id_recv.is_none() {
            slot.id_recv = Some(
                comm.start_recv(rank, Tag::CellId)
                    .map_err(|e| comm_fatal(rank, Tag::CellId, e))?,
            );
        } else if !slot.send_data {
            let request = match &slot.id_recv {
                Some(handle) => comm
                    .test_recv(handle)
                    .map_err(|e| comm_fatal(rank, Tag::CellId, e))?,
                None => None,
            };
            if let Some(bytes) = request {
                slot.serve_ids = util::decode_ids(&bytes).ok_or_else(|| MeshError::Payload {
                    peer: rank,
                    tag: Tag::CellId,
                    reason: format!("length {} is not a whole number of ids", bytes.len()),
                })?;
                slot.send_data = true;
            }
        }
        if slot.send_data {
            if slot.elem_send.is_none() {
                let mut payload = Vec::with_capacity(slot.serve_ids.len() * WIRE_SIZE);
                for &local in &slot.serve_ids {
                    let elem = window.get(local as usize).ok_or_else(|| MeshError::Payload {
                        peer: rank,
                        tag: Tag::CellId,
                        reason: format!("local id {} outside this rank's window", local),
                    })?;
                    elem.write_wire(&mut payload);
                }
                trace!("serving {} elements to rank {}", slot.serve_ids.len(), rank);
                slot.elem_send = Some(
                    comm.start_send(rank, Tag::Cell, payload)
                        .map_err(|e| comm_fatal(rank, Tag::Cell, e))?,
                );
            } else {
                let sent = match &slot.elem_send {
                    Some(handle) => comm
                        .test_send(handle)
                        .map_err(|e| comm_fatal(rank, Tag::Cell, e))?,
                    None => false,
                };
                if sent {
                    slot.elem_send = None;
                    slot.send_data = false;
                    slot.serve_ids.clear();
                    slot.id_recv = None;
                }
            }
        }
        Ok(())
    }
}

fn comm_fatal(peer: usize, tag: Tag, source: CommError) -> MeshError {
    MeshError::Comm { peer, tag, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChannelCommunicator;

    fn element(id: u32) -> Element {
        Element::new(id, (0.0, 1.0), (0.0, 1.0), (0.0, 1.0), 1.0, 1.0, 1.0, 1.0)
    }

    #[test]
    fn staging_counts_admitted_requests() {
        let mut engine = RequestEngine::new(2);
        assert!(engine.is_quiescent());
        engine.stage(1, 0);
        engine.stage(1, 3);
        assert!(!engine.is_quiescent());
        assert_eq!(engine.off_rank_reads(), 2);
        assert_eq!(engine.take_off_rank_reads(), 2);
        assert_eq!(engine.off_rank_reads(), 0);
    }

    #[test]
    fn two_engines_complete_a_fetch() {
        let mut bus = ChannelCommunicator::bus(2);
        let mut comm1 = bus.pop().unwrap();
        let mut comm0 = bus.pop().unwrap();

        let part0 = PartitionMap::new(0, vec![0, 1, 2]);
        let part1 = PartitionMap::new(1, vec![0, 1, 2]);
        let window0 = vec![element(0)];
        let window1 = vec![element(1)];
        let mut cache0 = RemoteCache::new(4);
        let mut cache1 = RemoteCache::new(4);
        let mut engine0 = RequestEngine::new(1);
        let mut engine1 = RequestEngine::new(1);

        // rank 0 wants global element 1, which is local id 0 on rank 1
        cache0.mark_requested(1);
        engine0.stage(0, 0);

        let mut fetched = false;
        for _ in 0..8 {
            fetched |= engine0
                .progress(&mut comm0, &part0, &window0, &mut cache0)
                .unwrap();
            engine1
                .progress(&mut comm1, &part1, &window1, &mut cache1)
                .unwrap();
        }
        assert!(fetched);
        assert!(cache0.contains(1));
        assert_eq!(cache0.get(1).unwrap().id(), 1);
        assert!(engine0.is_quiescent());
        assert!(engine1.is_quiescent());
    }

    #[test]
    fn ids_staged_mid_flight_go_out_in_the_next_dispatch() {
        let mut bus = ChannelCommunicator::bus(2);
        let mut comm1 = bus.pop().unwrap();
        let mut comm0 = bus.pop().unwrap();

        let part0 = PartitionMap::new(0, vec![0, 1, 4]);
        let part1 = PartitionMap::new(1, vec![0, 1, 4]);
        let window0 = vec![element(0)];
        let window1 = vec![element(1), element(2), element(3)];
        let mut cache0 = RemoteCache::new(8);
        let mut cache1 = RemoteCache::new(8);
        let mut engine0 = RequestEngine::new(1);
        let mut engine1 = RequestEngine::new(1);

        cache0.mark_requested(1);
        engine0.stage(0, 0);
        engine0
            .progress(&mut comm0, &part0, &window0, &mut cache0)
            .unwrap();
        // the first list is already dispatched; these ride the next one
        cache0.mark_requested(2);
        engine0.stage(0, 1);
        cache0.mark_requested(3);
        engine0.stage(0, 2);

        for _ in 0..12 {
            engine0
                .progress(&mut comm0, &part0, &window0, &mut cache0)
                .unwrap();
            engine1
                .progress(&mut comm1, &part1, &window1, &mut cache1)
                .unwrap();
        }
        assert!(cache0.contains(1) && cache0.contains(2) && cache0.contains(3));
        assert!(engine0.is_quiescent());
    }
}
