//! A minimal non-blocking message-passing API.
//!
//! This module exports the seam between the mesh and the collective
//! runtime, encapsulated by the [`comm::Communicator`] trait: tagged
//! point-to-point sends and receives of pure bytes (`Vec<u8>`), started
//! without blocking and polled for completion. A pure-Rust TCP transport
//! is included in [`tcp::TcpCommunicator`], an in-process transport in
//! [`channel::ChannelCommunicator`], and a single-rank stub in
//! [`null::NullCommunicator`].

mod channel;
mod comm;
mod null;
mod tcp;
pub mod util;

pub use channel::ChannelCommunicator;
pub use comm::{CommError, Communicator, RecvHandle, SendHandle, Tag};
pub use null::NullCommunicator;
pub use tcp::TcpCommunicator;
