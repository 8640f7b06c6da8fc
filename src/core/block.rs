use crate::core::proof_of_work::DIFFICULTY;
use crate::core::{ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use serde::{Deserialize, Serialize};

/// One link of the chain. `pre_block_hash` is empty for genesis; `hash`
/// is the proof-of-work header digest and doubles as the storage key.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    pre_block_hash: Vec<u8>,
    hash: Vec<u8>,
    transactions: Vec<Transaction>,
    nonce: i64,
    height: usize,
    difficulty: u64,
}

impl Block {
    /// Assemble and mine a block on top of `pre_block_hash`
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "a block needs at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            transactions: transactions.to_vec(),
            nonce: 0,
            height,
            difficulty: DIFFICULTY,
        };

        let pow = ProofOfWork::new_proof_of_work(block.clone())?;
        let (nonce, hash) = pow.run()?;
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// The block at height zero, carrying only the genesis coinbase
    pub fn generate_genesis_block(coinbase: &Transaction) -> Result<Block> {
        Block::new_block(vec![], &[coinbase.clone()], 0)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize(bytes)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_bytes(&self) -> Vec<u8> {
        self.hash.clone()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    /// Field-level constructor for tamper tests
    #[cfg(test)]
    pub fn for_test(
        timestamp: i64,
        pre_block_hash: Vec<u8>,
        hash: Vec<u8>,
        transactions: Vec<Transaction>,
        nonce: i64,
        height: usize,
        difficulty: u64,
    ) -> Block {
        Block {
            timestamp,
            pre_block_hash,
            hash,
            transactions,
            nonce,
            height,
            difficulty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn test_empty_block_rejected() {
        assert!(Block::new_block(vec![], &[], 0).is_err());
    }

    #[test]
    fn test_genesis_block_shape() {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let genesis = Block::generate_genesis_block(&coinbase).unwrap();

        assert!(genesis.get_pre_block_hash().is_empty());
        assert_eq!(genesis.get_height(), 0);
        assert_eq!(genesis.get_hash().len(), 32);
        assert_eq!(genesis.get_difficulty(), DIFFICULTY);
        assert!(ProofOfWork::validate(&genesis));
    }

    #[test]
    fn test_serialize_round_trip() {
        let wallet = Wallet::new().unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let block = Block::new_block(vec![0xab; 32], &[coinbase], 3).unwrap();

        let bytes = block.serialize().unwrap();
        let decoded = Block::deserialize(bytes.as_slice()).unwrap();

        assert_eq!(decoded.get_hash(), block.get_hash());
        assert_eq!(decoded.get_pre_block_hash(), block.get_pre_block_hash());
        assert_eq!(decoded.get_height(), 3);
        assert_eq!(decoded.get_nonce(), block.get_nonce());
        assert_eq!(decoded.get_timestamp(), block.get_timestamp());
        assert_eq!(decoded.get_transactions().len(), 1);
    }
}
