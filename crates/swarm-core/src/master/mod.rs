//! The master protocol client: wire codec, transport abstraction, the
//! connection itself, and per-process node identity.

mod client;
mod codec;
mod node;
mod transport;

pub use client::{MasterClient, OUTBOUND_CAPACITY};
pub use codec::{decode, encode, WireMessage};
pub use node::generate_node_id;
pub use transport::{FrameReader, FrameWriter, MasterTransport, TcpTransport};
