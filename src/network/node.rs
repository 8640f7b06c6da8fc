use std::sync::RwLock;

/// The known-peer set. The first entry is the canonical bootstrap node;
/// peers that fail to answer a dial get evicted.
pub struct Nodes {
    inner: RwLock<Vec<String>>,
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            inner: RwLock::new(vec![]),
        }
    }

    /// Add a peer address; returns false if it was already known
    pub fn add_node(&self, addr: String) -> bool {
        let mut inner = self.inner.write().expect("known-nodes lock poisoned");
        if inner.iter().any(|known| known.eq(&addr)) {
            return false;
        }
        inner.push(addr);
        true
    }

    pub fn evict_node(&self, addr: &str) {
        let mut inner = self.inner.write().expect("known-nodes lock poisoned");
        if let Some(idx) = inner.iter().position(|known| known.eq(addr)) {
            inner.remove(idx);
        }
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.iter().any(|known| known.eq(addr))
    }

    pub fn get_nodes(&self) -> Vec<String> {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
