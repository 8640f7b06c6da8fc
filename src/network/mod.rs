//! Peer-to-peer synchronization: the framed TCP protocol, message
//! handlers, and the known-peer set.

pub mod node;
pub mod server;

pub use node::Nodes;
pub use server::{send_tx, InvKind, Server, CENTRAL_NODE};
