//! Key management: ECDSA P-256 keypairs, base58check addresses, and the
//! per-node wallet file.

pub mod wallet;
pub mod wallets;

pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet,
    ADDRESS_CHECK_SUM_LEN,
};
pub use wallets::Wallets;
