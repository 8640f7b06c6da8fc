use crate::core::{Block, MerkleTree};
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;

/// Fixed network difficulty: a valid header digest must be strictly
/// below `1 << (256 - DIFFICULTY)`. Stored per block so a retarget
/// schedule can be introduced without changing the header layout.
pub const DIFFICULTY: u64 = if cfg!(test) { 12 } else { 16 };

const MAX_NONCE: i64 = i64::MAX;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
    merkle_root: Vec<u8>,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> Result<ProofOfWork> {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - block.get_difficulty() as usize);

        let tx_bytes = block
            .get_transactions()
            .iter()
            .map(|tx| tx.serialize())
            .collect::<Result<Vec<_>>>()?;
        let merkle_root = MerkleTree::from_serialized_txs(tx_bytes.as_slice())?
            .get_root_hash()
            .to_vec();

        Ok(ProofOfWork {
            block,
            target,
            merkle_root,
        })
    }

    /// Header bytes hashed by the puzzle:
    /// prev_hash || merkle_root || timestamp || difficulty || nonce,
    /// the three integers big-endian, 8 bytes each
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(self.block.get_pre_block_hash());
        data.extend(self.merkle_root.as_slice());
        data.extend(self.block.get_timestamp().to_be_bytes());
        data.extend(self.block.get_difficulty().to_be_bytes());
        data.extend(nonce.to_be_bytes());
        data
    }

    /// Search nonces from zero until the header digest drops below the
    /// target; returns the winning nonce and digest
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        let mut nonce = 0;
        info!(
            "mining block at height {} (difficulty {})",
            self.block.get_height(),
            self.block.get_difficulty()
        );

        while nonce < MAX_NONCE {
            let hash = sha256_digest(self.prepare_data(nonce).as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
            if hash_int < self.target {
                info!("found nonce {nonce}: {}", HEXLOWER.encode(hash.as_slice()));
                return Ok((nonce, hash));
            }
            nonce += 1;
        }

        Err(BlockchainError::Mining(
            "nonce space exhausted".to_string(),
        ))
    }

    /// Recompute the header digest for the block's stored nonce and
    /// check it against the target
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block.clone()) {
            Ok(pow) => pow,
            Err(_) => return false,
        };
        let hash = sha256_digest(pow.prepare_data(block.get_nonce()).as_slice());

        if hash != block.get_hash() {
            return false;
        }
        BigInt::from_bytes_be(Sign::Plus, hash.as_slice()) < pow.target
    }
}
