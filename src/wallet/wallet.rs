use crate::error::{BlockchainError, Result};
use crate::utils::{base58_decode, base58_encode, ripemd160_digest, sha256_digest};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const ADDRESS_VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// A single keypair. The private half is kept as PKCS#8 bytes so ring
/// can reconstruct the signing key; addresses are derived on demand.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| BlockchainError::Crypto(format!("bad PKCS#8 keypair: {e}")))?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    /// base58(version || ripemd160(sha256(pub_key)) || checksum)
    pub fn get_address(&self) -> String {
        convert_address(hash_pub_key(self.public_key.as_slice()).as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// RIPEMD160(SHA256(pub_key)) — the 20-byte hash outputs are locked to
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    ripemd160_digest(sha256_digest(pub_key).as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let double_sha = sha256_digest(sha256_digest(payload).as_slice());
    double_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Recompute the checksum of a base58 address and compare
pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };
    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let (body, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    checksum(body).eq(actual_checksum)
}

/// Render a 20-byte public key hash as a base58check address
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload = Vec::with_capacity(1 + pub_key_hash.len() + ADDRESS_CHECK_SUM_LEN);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum);
    base58_encode(payload.as_slice())
}

/// Strip version byte and checksum from a validated address
pub fn address_to_pub_key_hash(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(BlockchainError::InvalidAddress(address.to_string()));
    }
    let payload = base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();

        assert!(validate_address(&address));

        let pub_key_hash = address_to_pub_key_hash(&address).unwrap();
        assert_eq!(pub_key_hash.len(), 20);
        assert_eq!(pub_key_hash, hash_pub_key(wallet.get_public_key()));
        assert_eq!(convert_address(&pub_key_hash), address);
    }

    #[test]
    fn test_corrupted_address_fails_checksum() {
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address();

        // Flip the last character to another base58 digit
        let last = address.pop().unwrap();
        address.push(if last == '1' { '2' } else { '1' });

        assert!(!validate_address(&address));
        assert!(address_to_pub_key_hash(&address).is_err());
    }

    #[test]
    fn test_validate_rejects_short_payloads() {
        assert!(!validate_address(""));
        assert!(!validate_address("11"));
    }
}
