use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;

use tierstock_core::NetworkId;
use std::sync::Arc;

/// Network-isolated key/value store abstraction for disposable read
/// models.
pub trait NetworkStore<K, V>: Send + Sync {
    fn get(&self, network_id: NetworkId, key: &K) -> Option<V>;
    fn upsert(&self, network_id: NetworkId, key: K, value: V);
    fn list(&self, network_id: NetworkId) -> Vec<V>;
    /// Clear all read-model records for a network (rebuild support).
    fn clear_network(&self, network_id: NetworkId);
}

impl<K, V, S> NetworkStore<K, V> for Arc<S>
where
    S: NetworkStore<K, V> + ?Sized,
{
    fn get(&self, network_id: NetworkId, key: &K) -> Option<V> {
        (**self).get(network_id, key)
    }

    fn upsert(&self, network_id: NetworkId, key: K, value: V) {
        (**self).upsert(network_id, key, value)
    }

    fn list(&self, network_id: NetworkId) -> Vec<V> {
        (**self).list(network_id)
    }

    fn clear_network(&self, network_id: NetworkId) {
        (**self).clear_network(network_id)
    }
}

/// In-memory network-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryNetworkStore<K, V> {
    inner: RwLock<HashMap<(NetworkId, K), V>>,
}

impl<K, V> InMemoryNetworkStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryNetworkStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> NetworkStore<K, V> for InMemoryNetworkStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, network_id: NetworkId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(network_id, key.clone())).cloned()
    }

    fn upsert(&self, network_id: NetworkId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((network_id, key), value);
        }
    }

    fn list(&self, network_id: NetworkId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((n, _k), v)| if *n == network_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_network(&self, network_id: NetworkId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(n, _k), _v| *n != network_id);
        }
    }
}
