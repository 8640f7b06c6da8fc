//! Error handling for the node
//!
//! Every fallible operation in the crate returns [`Result`]. Network
//! handlers log and drop the connection; the CLI converts errors into a
//! message and a non-zero exit code.

use std::fmt;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error kinds surfaced by the node
#[derive(Debug, Clone)]
pub enum BlockchainError {
    /// A required block, transaction, or UTXO record is missing
    NotFound(String),
    /// Spendable outputs do not cover the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// Base58 decoding or checksum failure on an address
    InvalidAddress(String),
    /// ECDSA signature rejected
    InvalidSignature(String),
    /// Proof-of-work or height linkage check failed
    InvalidBlock(String),
    /// Structurally unacceptable transaction (zero amount, double spend)
    Transaction(String),
    /// The database is held by another process and the retry failed
    DbLocked(String),
    /// Other database failures (corrupt record, failed commit)
    Database(String),
    /// Malformed frame or unusable network payload
    Protocol(String),
    /// Key generation or signing failure
    Crypto(String),
    /// Entity encode/decode failure
    Serialization(String),
    /// Wallet file or key lookup failure
    Wallet(String),
    /// Missing or unusable process configuration
    Config(String),
    /// Nonce space exhausted while mining
    Mining(String),
    /// File or socket I/O failure
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::NotFound(what) => write!(f, "not found: {what}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
            BlockchainError::InvalidSignature(msg) => write!(f, "invalid signature: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "invalid block: {msg}"),
            BlockchainError::Transaction(msg) => write!(f, "transaction error: {msg}"),
            BlockchainError::DbLocked(msg) => write!(f, "database locked: {msg}"),
            BlockchainError::Database(msg) => write!(f, "database error: {msg}"),
            BlockchainError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            BlockchainError::Crypto(msg) => write!(f, "crypto error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "config error: {msg}"),
            BlockchainError::Mining(msg) => write!(f, "mining error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "i/o error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Database(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}
