use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch
pub fn current_timestamp() -> Result<i64> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("system time error: {e}")))?
        .as_millis();

    i64::try_from(millis).map_err(|_| BlockchainError::Crypto("timestamp overflow".to_string()))
}

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    context.finish().as_ref().to_vec()
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| BlockchainError::InvalidAddress(format!("bad base58: {e}")))
}

/// Generate a fresh P-256 keypair, returned as PKCS#8 bytes
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("keypair generation failed: {e}")))?;
    Ok(pkcs8.as_ref().to_vec())
}

/// Sign `message` with a PKCS#8 keypair; returns the raw r || s signature
pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("bad PKCS#8 keypair: {e}")))?;
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|e| BlockchainError::Crypto(format!("signing failed: {e}")))?;
    Ok(signature.as_ref().to_vec())
}

/// Verify a raw r || s signature against an uncompressed X || Y public key
pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let peer_public_key =
        ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key);
    peer_public_key.verify(message, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest_is_32_bytes() {
        let digest = sha256_digest(b"ferrite");
        assert_eq!(digest.len(), 32);
        // Same input, same digest
        assert_eq!(digest, sha256_digest(b"ferrite"));
        assert_ne!(digest, sha256_digest(b"ferrit"));
    }

    #[test]
    fn test_ripemd160_digest_is_20_bytes() {
        assert_eq!(ripemd160_digest(b"ferrite").len(), 20);
    }

    #[test]
    fn test_base58_round_trip() {
        let data = vec![0x00, 0xde, 0xad, 0xbe, 0xef];
        let encoded = base58_encode(&data);
        assert_eq!(base58_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_base58_rejects_invalid_characters() {
        // '0' and 'O' are not in the base58 alphabet
        assert!(base58_decode("0OIl").is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let pkcs8 = new_key_pair().unwrap();
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng).unwrap();
        let public_key = ring::signature::KeyPair::public_key(&key_pair).as_ref().to_vec();

        let message = b"spend output 3 of tx abc";
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, message).unwrap();

        assert!(ecdsa_p256_sha256_sign_verify(&public_key, &signature, message));
        assert!(!ecdsa_p256_sha256_sign_verify(
            &public_key,
            &signature,
            b"spend output 4 of tx abc"
        ));
    }
}
