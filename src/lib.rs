//! # ferrite-chain
//!
//! A minimal UTXO-model cryptocurrency node:
//!
//! - an append-only chain of proof-of-work blocks persisted in an
//!   embedded KV store (`core`, `storage::kv`)
//! - a derived index of unspent transaction outputs under the `"utxo-"`
//!   key prefix (`storage::utxo_set`)
//! - locally held ECDSA P-256 keypairs whose public-key hashes are
//!   base58check addresses (`wallet`)
//! - a TCP gossip layer for block and transaction propagation and
//!   initial block download (`network`)
//!
//! The `cli` module and `main.rs` expose the node operations as
//! subcommands; `NODE_ID` in the environment selects the per-node
//! database, wallet file, and listen port.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, MerkleTree, ProofOfWork, TXInput, TXOutput, TXOutputs,
    Transaction, DIFFICULTY, SUBSIDY,
};
pub use error::{BlockchainError, Result};
pub use network::{send_tx, InvKind, Nodes, Server, CENTRAL_NODE};
pub use storage::{BlockInTransit, KvStore, MemoryPool, UTXOSet};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
