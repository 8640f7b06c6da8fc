// The UTXO index: a derived view of the chain kept under the "utxo-"
// prefix of the same keyspace the blocks live in. Each record maps a
// transaction id to the outputs of that transaction not yet spent.

use crate::core::{Block, Blockchain, TXOutput, TXOutputs};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::info;
use std::collections::HashMap;
use std::io;

/// Prefix of every UTXO record key
pub const UTXO_PREFIX: &[u8] = b"utxo-";

/// Keys removed per batch while clearing the prefix region
const DELETE_BATCH_SIZE: usize = 100_000;

pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn utxo_key(txid: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(UTXO_PREFIX.len() + txid.len());
        key.extend_from_slice(UTXO_PREFIX);
        key.extend_from_slice(txid);
        key
    }

    /// Drop the whole index and rebuild it from the chain
    pub fn reindex(&self) -> Result<()> {
        self.delete_prefix_region()?;

        let utxo_map = self.blockchain.find_utxo()?;
        let kv = self.blockchain.get_kv();
        for (txid_hex, outs) in &utxo_map {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| BlockchainError::Serialization(format!("bad txid hex: {e}")))?;
            kv.insert(Self::utxo_key(txid.as_slice()).as_slice(), outs.serialize()?)?;
        }
        info!("utxo index rebuilt: {} transactions", utxo_map.len());
        Ok(())
    }

    fn delete_prefix_region(&self) -> Result<()> {
        let kv = self.blockchain.get_kv();
        let mut batch = sled::Batch::default();
        let mut pending = 0usize;

        for item in kv.scan_prefix(UTXO_PREFIX) {
            let (key, _) = item?;
            batch.remove(key);
            pending += 1;
            if pending == DELETE_BATCH_SIZE {
                kv.apply_batch(std::mem::take(&mut batch))?;
                pending = 0;
            }
        }
        if pending > 0 {
            kv.apply_batch(batch)?;
        }
        Ok(())
    }

    /// Fold one accepted block into the index. The whole block takes
    /// effect in a single KV transaction; on failure the caller must
    /// reindex.
    pub fn update(&self, block: &Block) -> Result<()> {
        // Precompute record keys and serialized output lists so the
        // transaction closure only moves bytes
        let mut inserts: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for tx in block.get_transactions() {
            let outputs = TXOutputs {
                outputs: tx.get_vout().to_vec(),
            };
            inserts.push((Self::utxo_key(tx.get_id()), outputs.serialize()?));
        }

        self.blockchain.get_kv().update(|tx_db| {
            for tx in block.get_transactions() {
                if !tx.is_coinbase() {
                    for vin in tx.get_vin() {
                        let key = Self::utxo_key(vin.get_txid());
                        let record = tx_db.get(key.as_slice())?.ok_or_else(|| {
                            sled::Error::Io(io::Error::new(
                                io::ErrorKind::NotFound,
                                "utxo record missing for spent output",
                            ))
                        })?;
                        let outs = TXOutputs::deserialize(record.as_ref()).map_err(|_| {
                            sled::Error::Io(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "corrupt utxo record",
                            ))
                        })?;

                        // Spent outputs are identified by index
                        let remaining: Vec<TXOutput> = outs
                            .outputs
                            .iter()
                            .enumerate()
                            .filter(|(idx, _)| *idx != vin.get_vout())
                            .map(|(_, out)| out.clone())
                            .collect();

                        if remaining.is_empty() {
                            tx_db.remove(key.as_slice())?;
                        } else {
                            let updated = TXOutputs { outputs: remaining };
                            let bytes = updated.serialize().map_err(|_| {
                                sled::Error::Io(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "utxo record encode failed",
                                ))
                            })?;
                            tx_db.insert(key.as_slice(), bytes)?;
                        }
                    }
                }
            }

            // Every transaction in the block contributes its full
            // output list, coinbase included
            for (key, bytes) in &inserts {
                tx_db.insert(key.as_slice(), bytes.as_slice())?;
            }
            Ok(())
        })
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<u64> {
        let mut counter = 0;
        for item in self.blockchain.get_kv().scan_prefix(UTXO_PREFIX) {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Every unspent output locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];
        for item in self.blockchain.get_kv().scan_prefix(UTXO_PREFIX) {
            let (_, value) = item?;
            let outs = TXOutputs::deserialize(value.as_ref())?;
            for out in outs.outputs {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out);
                }
            }
        }
        Ok(utxos)
    }

    /// Greedily gather outputs locked to `pub_key_hash` until they
    /// cover `amount`. Returns the accumulated value and the selected
    /// output indices grouped by hex txid; the accumulated value falls
    /// short when the balance cannot cover the amount.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut selected: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;

        for item in self.blockchain.get_kv().scan_prefix(UTXO_PREFIX) {
            let (key, value) = item?;
            let txid_hex = HEXLOWER.encode(&key.as_ref()[UTXO_PREFIX.len()..]);
            let outs = TXOutputs::deserialize(value.as_ref())?;

            for (idx, out) in outs.outputs.iter().enumerate() {
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    selected.entry(txid_hex.clone()).or_default().push(idx);
                }
            }
        }
        Ok((accumulated, selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Transaction, SUBSIDY};
    use crate::wallet::{hash_pub_key, Wallet};
    use tempfile::tempdir;

    fn indexed_chain() -> (UTXOSet, Wallet, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let wallet = Wallet::new().unwrap();
        let chain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            &dir.path().join("chain"),
        )
        .unwrap();
        let utxo_set = UTXOSet::new(chain);
        utxo_set.reindex().unwrap();
        (utxo_set, wallet, dir)
    }

    #[test]
    fn test_reindex_after_genesis() {
        let (utxo_set, wallet, _dir) = indexed_chain();
        assert_eq!(utxo_set.count_transactions().unwrap(), 1);

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let utxos = utxo_set.find_utxo(pub_key_hash.as_slice()).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].get_value(), SUBSIDY);
    }

    #[test]
    fn test_find_spendable_outputs_accumulates() {
        let (utxo_set, wallet, _dir) = indexed_chain();
        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, selected) = utxo_set
            .find_spendable_outputs(pub_key_hash.as_slice(), 40)
            .unwrap();
        assert!(accumulated >= 40);
        assert_eq!(selected.len(), 1);

        // More than the balance: everything gets selected but the
        // accumulated value falls short
        let (accumulated, _) = utxo_set
            .find_spendable_outputs(pub_key_hash.as_slice(), SUBSIDY + 1)
            .unwrap();
        assert_eq!(accumulated, SUBSIDY);
    }

    #[test]
    fn test_find_spendable_outputs_ignores_other_keys() {
        let (utxo_set, _, _dir) = indexed_chain();
        let stranger = Wallet::new().unwrap();
        let stranger_hash = hash_pub_key(stranger.get_public_key());

        let (accumulated, selected) = utxo_set
            .find_spendable_outputs(stranger_hash.as_slice(), 1)
            .unwrap();
        assert_eq!(accumulated, 0);
        assert!(selected.is_empty());
    }

    #[test]
    fn test_update_spends_and_inserts() {
        let (utxo_set, wallet, _dir) = indexed_chain();
        let recipient = Wallet::new().unwrap();

        let tx = Transaction::new_utxo_transaction(
            &wallet,
            &recipient.get_address(),
            30,
            &utxo_set,
        )
        .unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let block = utxo_set
            .get_blockchain()
            .mine_block(&[coinbase, tx])
            .unwrap();
        utxo_set.update(&block).unwrap();

        let sender_hash = hash_pub_key(wallet.get_public_key());
        let sender_balance: u64 = utxo_set
            .find_utxo(sender_hash.as_slice())
            .unwrap()
            .iter()
            .map(|out| out.get_value())
            .sum();
        // 100 genesis - 30 sent + 70 change + 100 fresh coinbase
        assert_eq!(sender_balance, 170);

        let recipient_hash = hash_pub_key(recipient.get_public_key());
        let recipient_balance: u64 = utxo_set
            .find_utxo(recipient_hash.as_slice())
            .unwrap()
            .iter()
            .map(|out| out.get_value())
            .sum();
        assert_eq!(recipient_balance, 30);
    }

    #[test]
    fn test_update_matches_reindex() {
        let (utxo_set, wallet, _dir) = indexed_chain();
        let recipient = Wallet::new().unwrap();

        let tx = Transaction::new_utxo_transaction(
            &wallet,
            &recipient.get_address(),
            55,
            &utxo_set,
        )
        .unwrap();
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let block = utxo_set
            .get_blockchain()
            .mine_block(&[coinbase, tx])
            .unwrap();
        utxo_set.update(&block).unwrap();

        let incremental_count = utxo_set.count_transactions().unwrap();
        let sender_hash = hash_pub_key(wallet.get_public_key());
        let incremental_balance: u64 = utxo_set
            .find_utxo(sender_hash.as_slice())
            .unwrap()
            .iter()
            .map(|out| out.get_value())
            .sum();

        // A rebuild from the chain lands on the same index
        utxo_set.reindex().unwrap();
        assert_eq!(utxo_set.count_transactions().unwrap(), incremental_count);
        let rebuilt_balance: u64 = utxo_set
            .find_utxo(sender_hash.as_slice())
            .unwrap()
            .iter()
            .map(|out| out.get_value())
            .sum();
        assert_eq!(rebuilt_balance, incremental_balance);
    }
}
