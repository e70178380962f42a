//! Provides a message-passing communicator based on TCP sockets.
//!
//! TCP is a connection-oriented protocol, which means that a connection
//! must be established between the sending and receiving ends of the
//! socket in order to read from or write to a stream. The
//! [`ConnectionPool`] hides that behind a pair of background threads, so
//! the communicator itself never blocks.

use super::comm::{CommError, Communicator, RecvHandle, SendHandle, Tag};
use super::util;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const READ_TIMEOUT: Duration = Duration::from_nanos(100);

type Outbound = (SocketAddr, u32, u32, Vec<u8>);
type Inbound = (usize, Tag, Vec<u8>);

/// Maintains a cache of ingoing and outgoing TCP connections.
///
/// Communicating with a remote peer opens a new connection on the first
/// call; subsequent communications with that peer reuse the cached
/// stream. Receiving drains whichever connection holds a complete frame;
/// when none does, the listener is polled for an incoming connection on
/// a short timeout. Frames carry (length, source rank, tag) ahead of the
/// payload so the receiving side can file them by sender and tag.
pub struct ConnectionPool {
    alive: Arc<AtomicBool>,
    send_s: Option<Sender<Outbound>>,
    recv_r: Option<Receiver<Inbound>>,
    send_thread: Option<thread::JoinHandle<()>>,
    recv_thread: Option<thread::JoinHandle<()>>,
}

impl ConnectionPool {
    fn poll(stream: &mut TcpStream) -> Option<Inbound> {
        util::read_u64_non_blocking(stream).and_then(|len| {
            let src = util::read_u32(stream) as usize;
            let tag = util::read_u32(stream);
            let payload = util::read_bytes_vec(stream, len as usize);
            match Tag::from_wire(tag) {
                Some(tag) => Some((src, tag, payload)),
                None => {
                    log::warn!("dropping frame with unknown tag {} from rank {}", tag, src);
                    None
                }
            }
        })
    }

    /// Creates a `ConnectionPool` from a `TcpListener`. The listener is
    /// placed in a non-blocking accept mode, so the pre-existing blocking
    /// mode is overwritten.
    pub fn from_listener(listener: TcpListener) -> Self {
        let (send_s, send_r) = unbounded::<Outbound>();
        let (recv_s, recv_r) = unbounded::<Inbound>();
        let alive = Arc::new(AtomicBool::new(true));
        let keep_receiving = alive.clone();

        // This thread takes the receiving end of the message sender channel.
        let send_thread = thread::spawn(move || {
            let mut streams = HashMap::new();
            for (address, src, tag, payload) in send_r {
                let stream = streams
                    .entry(address)
                    .or_insert_with(|| TcpStream::connect(address).unwrap());
                stream.write_all(&(payload.len() as u64).to_le_bytes()).unwrap();
                stream.write_all(&src.to_le_bytes()).unwrap();
                stream.write_all(&tag.to_le_bytes()).unwrap();
                stream.write_all(&payload).unwrap();
            }
        });
        listener.set_nonblocking(true).unwrap();

        // This thread takes the sending end of the message receiving channel.
        let recv_thread = thread::spawn(move || {
            let mut streams = Vec::new();
            while keep_receiving.load(Ordering::Relaxed) {
                for stream in &mut streams {
                    if let Some(frame) = Self::poll(stream) {
                        recv_s.send(frame).unwrap();
                    }
                }
                if let Ok((stream, _)) = listener.accept() {
                    stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
                    streams.push(stream)
                }
            }
        });

        Self {
            alive,
            send_s: Some(send_s),
            recv_r: Some(recv_r),
            send_thread: Some(send_thread),
            recv_thread: Some(recv_thread),
        }
    }

    /// Hands a frame to the send thread.
    fn send(&mut self, peer: SocketAddr, src: u32, tag: Tag, payload: Vec<u8>) -> Result<(), ()> {
        self.send_s
            .as_ref()
            .ok_or(())?
            .send((peer, src, tag.to_wire(), payload))
            .map_err(|_| ())
    }

    /// Takes the next arrived frame, if any.
    fn try_recv(&mut self) -> Result<Option<Inbound>, ()> {
        match self.recv_r.as_ref().ok_or(())?.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(()),
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.alive.swap(false, Ordering::Relaxed);
        self.send_s.take();
        if let Some(thread) = self.send_thread.take() {
            thread.join().unwrap();
        }
        if let Some(thread) = self.recv_thread.take() {
            thread.join().unwrap();
        }
    }
}

/// A [`Communicator`] whose ranks are TCP endpoints; rank `r` listens on
/// `peers[r]`.
pub struct TcpCommunicator {
    rank: usize,
    peers: Vec<SocketAddr>,
    pool: ConnectionPool,
    undelivered: Vec<Inbound>,
    next_send: u64,
}

impl TcpCommunicator {
    pub fn new(rank: usize, peers: Vec<SocketAddr>) -> Self {
        let listener = TcpListener::bind(peers[rank]).unwrap();
        Self {
            rank,
            peers,
            pool: ConnectionPool::from_listener(listener),
            undelivered: Vec::new(),
            next_send: 0,
        }
    }

    fn drain(&mut self) -> Result<(), ()> {
        while let Some(frame) = self.pool.try_recv()? {
            self.undelivered.push(frame);
        }
        Ok(())
    }
}

impl Communicator for TcpCommunicator {
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
        self.pool
            .send(self.peers[peer], self.rank as u32, tag, payload)
            .map_err(|_| CommError::Disconnected(peer))?;
        let handle = SendHandle(self.next_send);
        self.next_send += 1;
        Ok(handle)
    }

    fn test_send(&mut self, _handle: &SendHandle) -> Result<bool, CommError> {
        // hand-off to the send thread is delivery from this rank's side
        Ok(true)
    }

    fn start_recv(&mut self, peer: usize, tag: Tag) -> Result<RecvHandle, CommError> {
        Ok(RecvHandle { peer, tag })
    }

    fn test_recv(&mut self, handle: &RecvHandle) -> Result<Option<Vec<u8>>, CommError> {
        let disconnected = self.drain().is_err();
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
