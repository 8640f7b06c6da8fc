use crate::error::{BlockchainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// The wallet collection of one node: every keypair it controls, keyed
/// by address. Loaded fully into memory; the file holds private keys in
/// the clear.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    file_path: PathBuf,
}

impl Wallets {
    /// Open (or start) the wallet file for a node id
    pub fn new(node_id: &str) -> Result<Wallets> {
        Self::with_file(PathBuf::from(format!("./tmp/wallets_{node_id}.data")))
    }

    /// Open a wallet collection backed by an explicit file
    pub fn with_file(file_path: PathBuf) -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            file_path,
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    /// Mint a new keypair, persist the collection, return the address
    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }

        let mut file = File::open(&self.file_path)
            .map_err(|e| BlockchainError::Wallet(format!("cannot open wallet file: {e}")))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .map_err(|e| BlockchainError::Wallet(format!("cannot read wallet file: {e}")))?;
        self.wallets = deserialize(buf.as_slice())?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(dir) = self.file_path.parent() {
            if dir != Path::new("") {
                fs::create_dir_all(dir)
                    .map_err(|e| BlockchainError::Wallet(format!("cannot create {dir:?}: {e}")))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.file_path)
            .map_err(|e| BlockchainError::Wallet(format!("cannot open wallet file: {e}")))?;
        let mut writer = BufWriter::new(file);
        let bytes = serialize(&self.wallets)?;
        writer.write_all(bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallets_test.data");

        let address = {
            let mut wallets = Wallets::with_file(path.clone()).unwrap();
            let address = wallets.create_wallet().unwrap();
            assert!(wallets.get_wallet(&address).is_some());
            address
        };

        // A fresh collection over the same file sees the persisted key
        let reloaded = Wallets::with_file(path).unwrap();
        assert_eq!(reloaded.get_addresses(), vec![address.clone()]);
        let wallet = reloaded.get_wallet(&address).unwrap();
        assert_eq!(wallet.get_address(), address);
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let wallets = Wallets::with_file(dir.path().join("absent.data")).unwrap();
        assert!(wallets.get_addresses().is_empty());
    }
}
