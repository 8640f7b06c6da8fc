use crate::error::{BlockchainError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

const NODE_ID_KEY: &str = "NODE_ID";
const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";

/// Process-wide settings. `NODE_ID` selects the per-node database path,
/// wallet file, and listen port; the node address is derived from it.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            if !node_id.is_empty() {
                map.insert(NODE_ADDRESS_KEY.to_string(), format!("127.0.0.1:{node_id}"));
                map.insert(NODE_ID_KEY.to_string(), node_id);
            }
        }
        Config {
            inner: RwLock::new(map),
        }
    }

    /// The node id, required by every command that touches the chain or
    /// the wallet file; an unset or empty NODE_ID is rejected
    pub fn get_node_id(&self) -> Result<String> {
        let inner = self.inner.read().expect("config lock poisoned");
        inner
            .get(NODE_ID_KEY)
            .cloned()
            .ok_or_else(|| BlockchainError::Config("NODE_ID env is not set".to_string()))
    }

    /// Listen address of this node (empty until NODE_ID is known)
    pub fn get_node_addr(&self) -> String {
        let inner = self.inner.read().expect("config lock poisoned");
        inner.get(NODE_ADDRESS_KEY).cloned().unwrap_or_default()
    }

    pub fn set_mining_addr(&self, addr: String) {
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner.insert(MINING_ADDRESS_KEY.to_string(), addr);
    }

    pub fn get_mining_addr(&self) -> Option<String> {
        let inner = self.inner.read().expect("config lock poisoned");
        inner.get(MINING_ADDRESS_KEY).cloned()
    }

    pub fn is_miner(&self) -> bool {
        let inner = self.inner.read().expect("config lock poisoned");
        inner.contains_key(MINING_ADDRESS_KEY)
    }
}
