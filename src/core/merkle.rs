use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;

/// Binary SHA-256 tree over the serialized transactions of a block.
/// Only the root is retained; proof generation for light clients is out
/// of scope.
pub struct MerkleTree {
    root_hash: Vec<u8>,
    leaf_count: usize,
}

impl MerkleTree {
    /// Build the tree from raw transaction serializations. Leaves are
    /// `SHA256(tx_bytes)`; each internal node is `SHA256(left || right)`.
    /// A level with an odd node count duplicates its last node before
    /// pairing; a single leaf is its own root.
    pub fn from_serialized_txs(tx_bytes: &[Vec<u8>]) -> Result<MerkleTree> {
        if tx_bytes.is_empty() {
            return Err(BlockchainError::InvalidBlock(
                "cannot build a merkle tree from zero transactions".to_string(),
            ));
        }

        let mut level: Vec<Vec<u8>> = tx_bytes
            .iter()
            .map(|bytes| sha256_digest(bytes.as_slice()))
            .collect();

        while level.len() > 1 {
            if level.len() % 2 != 0 {
                let last = level[level.len() - 1].clone();
                level.push(last);
            }

            level = level
                .chunks(2)
                .map(|pair| {
                    let mut combined = pair[0].clone();
                    combined.extend_from_slice(pair[1].as_slice());
                    sha256_digest(combined.as_slice())
                })
                .collect();
        }

        Ok(MerkleTree {
            root_hash: level.remove(0),
            leaf_count: tx_bytes.len(),
        })
    }

    pub fn get_root_hash(&self) -> &[u8] {
        self.root_hash.as_slice()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(MerkleTree::from_serialized_txs(&[]).is_err());
    }

    #[test]
    fn test_single_leaf_is_its_own_root() {
        let tree = MerkleTree::from_serialized_txs(&[b"tx0".to_vec()]).unwrap();
        assert_eq!(tree.get_root_hash(), sha256_digest(b"tx0").as_slice());
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn test_two_leaves_hash_together() {
        let tree =
            MerkleTree::from_serialized_txs(&[b"tx0".to_vec(), b"tx1".to_vec()]).unwrap();

        let mut combined = sha256_digest(b"tx0");
        combined.extend(sha256_digest(b"tx1"));
        assert_eq!(tree.get_root_hash(), sha256_digest(&combined).as_slice());
    }

    #[test]
    fn test_odd_count_duplicates_last_leaf() {
        let three =
            MerkleTree::from_serialized_txs(&[b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
                .unwrap();
        let four = MerkleTree::from_serialized_txs(&[
            b"a".to_vec(),
            b"b".to_vec(),
            b"c".to_vec(),
            b"c".to_vec(),
        ])
        .unwrap();

        assert_eq!(three.get_root_hash(), four.get_root_hash());
    }

    #[test]
    fn test_order_matters() {
        let ab = MerkleTree::from_serialized_txs(&[b"a".to_vec(), b"b".to_vec()]).unwrap();
        let ba = MerkleTree::from_serialized_txs(&[b"b".to_vec(), b"a".to_vec()]).unwrap();
        assert_ne!(ab.get_root_hash(), ba.get_root_hash());
    }
}
