//! Consensus and ledger: blocks, transactions, proof-of-work, and the
//! persistent chain store.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator};
pub use merkle::MerkleTree;
pub use proof_of_work::{ProofOfWork, DIFFICULTY};
pub use transaction::{
    TXInput, TXOutput, TXOutputs, Transaction, COINBASE_OUTPUT_INDEX, SUBSIDY,
};
