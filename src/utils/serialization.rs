//! Bincode encode/decode helpers shared by disk storage, the wallet
//! file, and transaction ID hashing. The standard configuration is part
//! of the on-disk format; changing it breaks every stored record.

use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(data, bincode::config::standard())
        .map_err(|e| BlockchainError::Serialization(format!("encode failed: {e}")))
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| BlockchainError::Serialization(format!("decode failed: {e}")))?;
    Ok(data)
}
