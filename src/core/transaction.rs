// UTXO transaction model: every transfer consumes previously unspent
// outputs and creates new ones. A coinbase mints the fixed subsidy and
// is the only source of coin, so inputs and outputs of a regular
// transaction must balance exactly.

use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{hash_pub_key, validate_address, Wallet};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Block subsidy minted by each coinbase
pub const SUBSIDY: u64 = 100;

/// Output-index sentinel carried by the synthetic coinbase input
pub const COINBASE_OUTPUT_INDEX: usize = usize::MAX;

/// Reference to an output of an earlier transaction, plus the material
/// proving the spender may consume it
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: usize,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize, pub_key: &[u8]) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: pub_key.to_vec(),
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }
}

/// An amount locked to a public key hash
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    /// Lock `value` to the owner of `address`
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if !validate_address(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }
        let pub_key_hash = crate::wallet::address_to_pub_key_hash(address)?;
        Ok(TXOutput {
            value,
            pub_key_hash,
        })
    }

    /// Lock `value` directly to a 20-byte public key hash
    pub fn with_pub_key_hash(value: u64, pub_key_hash: &[u8]) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash: pub_key_hash.to_vec(),
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// The unspent outputs of one transaction, as stored in the UTXO index
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutputs {
    pub outputs: Vec<TXOutput>,
}

impl TXOutputs {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TXOutputs> {
        deserialize(bytes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Coinbase with a random tag in the synthetic input
    pub fn new_coinbase_tx(to: &str) -> Result<Transaction> {
        Self::new_coinbase_tx_with_memo(to, "")
    }

    /// Coinbase minting the subsidy to `to`. The synthetic input has no
    /// previous output; its pub_key field carries the memo as tag bytes.
    pub fn new_coinbase_tx_with_memo(to: &str, memo: &str) -> Result<Transaction> {
        let tag = if memo.is_empty() {
            Uuid::new_v4().as_bytes().to_vec()
        } else {
            memo.as_bytes().to_vec()
        };
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_OUTPUT_INDEX,
            signature: vec![],
            pub_key: tag,
        };
        let tx_output = TXOutput::new(SUBSIDY, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build and sign a transfer of `amount` from `wallet`'s address to
    /// `to`, drawing on the UTXO index for spendable outputs
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "amount must be positive".to_string(),
            ));
        }
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(to.to_string()));
        }

        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(pub_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| BlockchainError::Serialization(format!("bad txid hex: {e}")))?;
            for out in outs {
                inputs.push(TXInput::new(&txid, out, wallet.get_public_key()));
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            // Change back to the sender
            outputs.push(TXOutput::with_pub_key_hash(
                accumulated - amount,
                pub_key_hash.as_slice(),
            ));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        utxo_set
            .get_blockchain()
            .sign_transaction(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1
            && self.vin[0].txid.is_empty()
            && self.vin[0].vout == COINBASE_OUTPUT_INDEX
    }

    /// SHA-256 of the serialized transaction with the id field cleared
    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(serialize(&tx_copy)?.as_slice()))
    }

    /// Copy of this transaction with every input's signature and public
    /// key cleared. Signing and verification both operate on it.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput {
                txid: input.txid.clone(),
                vout: input.vout,
                signature: vec![],
                pub_key: vec![],
            })
            .collect();
        Transaction {
            id: vec![],
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// Digest bound to a single input: the trimmed copy with only this
    /// input's pub_key replaced by the referenced output's key hash.
    /// Including the outputs ties the signature to where the value goes.
    fn trimmed_input_digest(&self, input_index: usize, prev_pub_key_hash: &[u8]) -> Result<Vec<u8>> {
        let mut tx_copy = self.trimmed_copy();
        tx_copy.vin[input_index].pub_key = prev_pub_key_hash.to_vec();
        Ok(sha256_digest(serialize(&tx_copy)?.as_slice()))
    }

    /// Sign every input against the outputs it spends. `prev_txs` maps
    /// hex txid to the referenced transaction and must cover all inputs.
    pub fn sign(&mut self, prev_txs: &HashMap<String, Transaction>, pkcs8: &[u8]) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        for idx in 0..self.vin.len() {
            let txid_hex = HEXLOWER.encode(self.vin[idx].get_txid());
            let prev_tx = prev_txs
                .get(txid_hex.as_str())
                .ok_or_else(|| BlockchainError::NotFound(format!("previous tx {txid_hex}")))?;
            let prev_out = prev_tx.vout.get(self.vin[idx].vout).ok_or_else(|| {
                BlockchainError::NotFound(format!(
                    "output {} of tx {txid_hex}",
                    self.vin[idx].vout
                ))
            })?;

            let digest = self.trimmed_input_digest(idx, prev_out.get_pub_key_hash())?;
            self.vin[idx].signature = ecdsa_p256_sha256_sign_digest(pkcs8, digest.as_slice())?;
        }
        Ok(())
    }

    /// Check every input signature against the carried public key. A
    /// missing previous transaction is an error; a bad signature is a
    /// `false` verdict. Coinbases verify trivially.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        for (idx, vin) in self.vin.iter().enumerate() {
            let txid_hex = HEXLOWER.encode(vin.get_txid());
            let prev_tx = prev_txs
                .get(txid_hex.as_str())
                .ok_or_else(|| BlockchainError::NotFound(format!("previous tx {txid_hex}")))?;
            let prev_out = match prev_tx.vout.get(vin.vout) {
                Some(out) => out,
                None => return Ok(false),
            };

            let digest = self.trimmed_input_digest(idx, prev_out.get_pub_key_hash())?;
            if !ecdsa_p256_sha256_sign_verify(
                vin.get_pub_key(),
                vin.get_signature(),
                digest.as_slice(),
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}
