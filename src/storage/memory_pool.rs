use crate::core::Transaction;
use data_encoding::HEXLOWER;
use std::collections::HashMap;
use std::sync::RwLock;

/// Transactions waiting to be mined, keyed by hex txid. Held until a
/// block includes them; there is no eviction policy.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, tx: Transaction) {
        let mut pool = self.inner.write().expect("memory pool lock poisoned");
        pool.insert(HEXLOWER.encode(tx.get_id()), tx);
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.get(txid_hex).cloned()
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.contains_key(txid_hex)
    }

    pub fn remove(&self, txid_hex: &str) {
        let mut pool = self.inner.write().expect("memory pool lock poisoned");
        pool.remove(txid_hex);
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Block hashes announced by a peer but not yet downloaded; drained one
/// hash at a time during initial block download
pub struct BlockInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_blocks(&self, hashes: &[Vec<u8>]) {
        let mut inner = self.inner.write().expect("blocks-in-transit lock poisoned");
        for hash in hashes {
            if !inner.iter().any(|h| h == hash) {
                inner.push(hash.clone());
            }
        }
    }

    pub fn first(&self) -> Option<Vec<u8>> {
        let inner = self.inner.read().expect("blocks-in-transit lock poisoned");
        inner.first().cloned()
    }

    pub fn remove(&self, hash: &[u8]) {
        let mut inner = self.inner.write().expect("blocks-in-transit lock poisoned");
        if let Some(idx) = inner.iter().position(|h| h.as_slice() == hash) {
            inner.remove(idx);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("blocks-in-transit lock poisoned");
        inner.clear();
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().expect("blocks-in-transit lock poisoned");
        inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn test_pool_add_get_remove() {
        let pool = MemoryPool::new();
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address()).unwrap();
        let txid_hex = HEXLOWER.encode(tx.get_id());

        assert!(pool.is_empty());
        pool.add(tx);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&txid_hex));
        assert!(pool.get(&txid_hex).is_some());

        pool.remove(&txid_hex);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_transit_queue_order_and_dedup() {
        let transit = BlockInTransit::new();
        transit.add_blocks(&[vec![1], vec![2], vec![1]]);

        assert_eq!(transit.first(), Some(vec![1]));
        transit.remove(&[1]);
        assert_eq!(transit.first(), Some(vec![2]));
        transit.remove(&[2]);
        assert!(transit.is_empty());
    }
}
