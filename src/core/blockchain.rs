// The chain store: blocks persisted by hash, the "lh" key pointing at
// the tip, and everything needed to extend the chain safely. All writes
// that move the tip happen inside a single KV transaction.

use crate::core::{Block, ProofOfWork, TXOutputs, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::KvStore;
use data_encoding::HEXLOWER;
use log::info;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Key of the tip pointer
const TIP_KEY: &[u8] = b"lh";

/// Memo carried by the genesis coinbase
const GENESIS_MEMO: &str = "First block data";

#[derive(Clone)]
pub struct Blockchain {
    // Cached copy of the "lh" key so reads skip the database
    tip_hash: Arc<RwLock<Vec<u8>>>,
    kv: KvStore,
}

impl Blockchain {
    fn node_db_path(node_id: &str) -> PathBuf {
        PathBuf::from(format!("./tmp/blocks_{node_id}"))
    }

    /// Initialize a fresh chain for a node: fails if its database
    /// already exists, otherwise mines the genesis block paying the
    /// subsidy to `genesis_address`
    pub fn create_blockchain(genesis_address: &str, node_id: &str) -> Result<Blockchain> {
        Self::create_blockchain_with_path(genesis_address, &Self::node_db_path(node_id))
    }

    /// Open the existing chain of a node; fails if none was created
    pub fn open_blockchain(node_id: &str) -> Result<Blockchain> {
        Self::open_blockchain_with_path(&Self::node_db_path(node_id))
    }

    pub fn create_blockchain_with_path(genesis_address: &str, path: &Path) -> Result<Blockchain> {
        if KvStore::exists(path) {
            return Err(BlockchainError::Database(format!(
                "blockchain already exists at {path:?}"
            )));
        }

        let kv = KvStore::open(path)?;
        let coinbase = Transaction::new_coinbase_tx_with_memo(genesis_address, GENESIS_MEMO)?;
        let genesis = Block::generate_genesis_block(&coinbase)?;
        info!(
            "genesis block {} created for {genesis_address}",
            HEXLOWER.encode(genesis.get_hash())
        );

        let hash = genesis.get_hash_bytes();
        let data = genesis.serialize()?;
        kv.update(|tx_db| {
            tx_db.insert(hash.as_slice(), data.as_slice())?;
            tx_db.insert(TIP_KEY, hash.as_slice())?;
            Ok(())
        })?;
        kv.flush()?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(hash)),
            kv,
        })
    }

    pub fn open_blockchain_with_path(path: &Path) -> Result<Blockchain> {
        if !KvStore::exists(path) {
            return Err(BlockchainError::NotFound(format!(
                "no existing blockchain at {path:?}, create one first"
            )));
        }

        let kv = KvStore::open(path)?;
        let tip_hash = kv
            .get(TIP_KEY)?
            .ok_or_else(|| BlockchainError::Database("tip pointer missing".to_string()))?
            .to_vec();

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            kv,
        })
    }

    pub fn get_kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .expect("tip hash lock poisoned")
            .clone()
    }

    fn set_tip_hash(&self, new_tip: &[u8]) {
        let mut tip_hash = self.tip_hash.write().expect("tip hash lock poisoned");
        *tip_hash = new_tip.to_vec();
    }

    /// Verify `transactions`, mine a block on top of the current tip,
    /// and persist it. Nothing is written if any transaction fails.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        for tx in transactions {
            if !self.verify_transaction(tx)? {
                return Err(BlockchainError::InvalidSignature(format!(
                    "transaction {} failed verification",
                    HEXLOWER.encode(tx.get_id())
                )));
            }
        }
        Self::reject_intra_block_double_spends(transactions)?;

        let best_height = self.get_best_height()?;
        let block = Block::new_block(self.get_tip_hash(), transactions, best_height + 1)?;
        self.write_block(&block)?;
        info!(
            "mined block {} at height {}",
            HEXLOWER.encode(block.get_hash()),
            block.get_height()
        );
        Ok(block)
    }

    /// Accept a block from a peer. Duplicates are a no-op; the tip
    /// advances only when the new block is strictly higher than the
    /// current tip (longest chain by height, ties keep the tip).
    pub fn add_block(&self, block: &Block) -> Result<()> {
        if !ProofOfWork::validate(block) {
            return Err(BlockchainError::InvalidBlock(format!(
                "proof of work check failed for {}",
                HEXLOWER.encode(block.get_hash())
            )));
        }
        self.write_block(block)?;
        Ok(())
    }

    /// Store a block and advance the tip when it wins on height; the
    /// tip comparison happens inside the same transaction as the write
    fn write_block(&self, block: &Block) -> Result<bool> {
        let hash = block.get_hash_bytes();
        let data = block.serialize()?;

        let advanced = self.kv.update(|tx_db| {
            if tx_db.get(hash.as_slice())?.is_some() {
                return Ok(false);
            }
            tx_db.insert(hash.as_slice(), data.as_slice())?;

            let tip_hash = tx_db.get(TIP_KEY)?.ok_or_else(|| {
                sled::Error::Io(io::Error::new(io::ErrorKind::NotFound, "tip pointer missing"))
            })?;
            let tip_bytes = tx_db.get(tip_hash)?.ok_or_else(|| {
                sled::Error::Io(io::Error::new(io::ErrorKind::NotFound, "tip block missing"))
            })?;
            let tip_block = Block::deserialize(tip_bytes.as_ref()).map_err(|_| {
                sled::Error::Io(io::Error::new(io::ErrorKind::InvalidData, "corrupt tip block"))
            })?;

            if block.get_height() > tip_block.get_height() {
                tx_db.insert(TIP_KEY, hash.as_slice())?;
                Ok(true)
            } else {
                Ok(false)
            }
        })?;

        if advanced {
            self.set_tip_hash(hash.as_slice());
        }
        Ok(advanced)
    }

    fn reject_intra_block_double_spends(transactions: &[Transaction]) -> Result<()> {
        let mut spent: HashSet<(Vec<u8>, usize)> = HashSet::new();
        for tx in transactions {
            if tx.is_coinbase() {
                continue;
            }
            for vin in tx.get_vin() {
                let reference = (vin.get_txid().to_vec(), vin.get_vout());
                if !spent.insert(reference) {
                    return Err(BlockchainError::Transaction(format!(
                        "output {}:{} spent twice in one block",
                        HEXLOWER.encode(vin.get_txid()),
                        vin.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get_best_height(&self) -> Result<usize> {
        let tip_hash = self.get_tip_hash();
        let tip_block = self
            .get_block(tip_hash.as_slice())?
            .ok_or_else(|| BlockchainError::Database("tip block missing".to_string()))?;
        Ok(tip_block.get_height())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        match self.kv.get(block_hash)? {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// All block hashes, tip to genesis
    pub fn get_block_hashes(&self) -> Vec<Vec<u8>> {
        self.iterator().map(|block| block.get_hash_bytes()).collect()
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator {
            kv: self.kv.clone(),
            current_hash: self.get_tip_hash(),
        }
    }

    /// Linear scan over the whole chain; used where the UTXO index does
    /// not carry enough metadata, notably when signing fresh inputs
    pub fn find_transaction(&self, txid: &[u8]) -> Option<Transaction> {
        for block in self.iterator() {
            for tx in block.get_transactions() {
                if txid.eq(tx.get_id()) {
                    return Some(tx.clone());
                }
            }
        }
        None
    }

    fn collect_prev_txs(&self, tx: &Transaction) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for vin in tx.get_vin() {
            let prev_tx = self.find_transaction(vin.get_txid()).ok_or_else(|| {
                BlockchainError::NotFound(format!(
                    "previous tx {}",
                    HEXLOWER.encode(vin.get_txid())
                ))
            })?;
            prev_txs.insert(HEXLOWER.encode(vin.get_txid()), prev_tx);
        }
        Ok(prev_txs)
    }

    /// Sign every input of `tx` against the chain it spends from
    pub fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        let prev_txs = self.collect_prev_txs(tx)?;
        tx.sign(&prev_txs, pkcs8)
    }

    /// Full validity check under current chain state: referenced outputs
    /// exist, value is conserved, and every signature holds
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }

        let prev_txs = self.collect_prev_txs(tx)?;

        let mut input_total: u64 = 0;
        for vin in tx.get_vin() {
            let prev_tx = &prev_txs[&HEXLOWER.encode(vin.get_txid())];
            let prev_out = match prev_tx.get_vout().get(vin.get_vout()) {
                Some(out) => out,
                None => return Ok(false),
            };
            input_total = match input_total.checked_add(prev_out.get_value()) {
                Some(sum) => sum,
                None => return Ok(false),
            };
        }

        let mut output_total: u64 = 0;
        for vout in tx.get_vout() {
            output_total = match output_total.checked_add(vout.get_value()) {
                Some(sum) => sum,
                None => return Ok(false),
            };
        }

        if input_total != output_total {
            log::warn!(
                "value not conserved in tx {}: in={input_total}, out={output_total}",
                HEXLOWER.encode(tx.get_id())
            );
            return Ok(false);
        }

        tx.verify(&prev_txs)
    }

    /// Walk the chain from the tip and collect every output not spent
    /// by a later input, keyed by hex txid. Feeds the UTXO reindex.
    pub fn find_utxo(&self) -> Result<HashMap<String, TXOutputs>> {
        let mut utxo: HashMap<String, TXOutputs> = HashMap::new();
        let mut spent: HashMap<String, Vec<usize>> = HashMap::new();

        // Tip-to-genesis order: a spend is always seen before the
        // output it consumes
        for block in self.iterator() {
            for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());

                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if spent
                        .get(txid_hex.as_str())
                        .is_some_and(|outs| outs.contains(&idx))
                    {
                        continue;
                    }
                    utxo.entry(txid_hex.clone())
                        .or_default()
                        .outputs
                        .push(out.clone());
                }

                if tx.is_coinbase() {
                    continue;
                }
                for vin in tx.get_vin() {
                    spent
                        .entry(HEXLOWER.encode(vin.get_txid()))
                        .or_default()
                        .push(vin.get_vout());
                }
            }
        }
        Ok(utxo)
    }
}

/// Single-pass pull iterator from the tip back to genesis
pub struct BlockchainIterator {
    kv: KvStore,
    current_hash: Vec<u8>,
}

impl Iterator for BlockchainIterator {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.current_hash.is_empty() {
            return None;
        }
        let data = self.kv.get(self.current_hash.as_slice()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_pre_block_hash().to_vec();
        Some(block)
    }
}
