use std::sync::Arc;

use nem_push_domain::model::NetworkTag;
use tracing::warn;

use crate::{rpc::NodeClient, worker::MonitorError};

/// Node clients grouped by network. Requests are spread by a uniform random
/// draw among the clients of the requested network.
pub struct ClientPool {
    production: Vec<Arc<dyn NodeClient>>,
    test: Vec<Arc<dyn NodeClient>>,
}

impl ClientPool {
    /// Groups `clients` by their network. Both networks need at least one
    /// client, otherwise the pool is rejected at startup.
    pub fn new(clients: Vec<Arc<dyn NodeClient>>) -> Result<Self, MonitorError> {
        let (test, production): (Vec<_>, Vec<_>) = clients
            .into_iter()
            .partition(|client| client.network() == NetworkTag::Test);
        if production.is_empty() {
            return Err(MonitorError::NoClients(NetworkTag::Production));
        }
        if test.is_empty() {
            return Err(MonitorError::NoClients(NetworkTag::Test));
        }
        Ok(Self { production, test })
    }

    pub fn clients(&self, network: NetworkTag) -> &[Arc<dyn NodeClient>] {
        match network {
            NetworkTag::Production => &self.production,
            NetworkTag::Test => &self.test,
        }
    }

    pub fn all_clients(&self) -> impl Iterator<Item = &Arc<dyn NodeClient>> {
        self.production.iter().chain(self.test.iter())
    }

    pub fn select(&self, network: NetworkTag) -> Arc<dyn NodeClient> {
        let clients = self.clients(network);
        Arc::clone(&clients[random_index(clients.len())])
    }
}

fn random_index(len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    match getrandom::u64() {
        Ok(value) => (value % len as u64) as usize,
        Err(err) => {
            warn!(%err, "os rng unavailable, using first client");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::BlockStream;
    use async_trait::async_trait;
    use nem_push_domain::model::{Address, MosaicAmount, MosaicId};
    use std::collections::HashSet;

    struct NamedNode {
        host: String,
        network: NetworkTag,
    }

    #[async_trait]
    impl NodeClient for NamedNode {
        fn host(&self) -> &str {
            &self.host
        }

        fn network(&self) -> NetworkTag {
            self.network
        }

        async fn subscribe_blocks(&self) -> Result<Box<dyn BlockStream>, MonitorError> {
            Err(MonitorError::Rpc("not used".into()))
        }

        async fn account_mosaics(
            &self,
            _address: &Address,
        ) -> Result<Vec<MosaicAmount>, MonitorError> {
            Ok(Vec::new())
        }

        async fn mosaic_divisibility(
            &self,
            _mosaic: &MosaicId,
        ) -> Result<Option<u8>, MonitorError> {
            Ok(None)
        }
    }

    fn node(host: &str, network: NetworkTag) -> Arc<dyn NodeClient> {
        Arc::new(NamedNode {
            host: host.into(),
            network,
        })
    }

    #[test]
    fn rejects_missing_network() {
        let err = ClientPool::new(vec![node("a", NetworkTag::Production)])
            .err()
            .expect("test pool missing");
        assert!(matches!(err, MonitorError::NoClients(NetworkTag::Test)));
    }

    #[test]
    fn select_stays_within_network() {
        let pool = ClientPool::new(vec![
            node("main-1", NetworkTag::Production),
            node("main-2", NetworkTag::Production),
            node("test-1", NetworkTag::Test),
        ])
        .expect("pool builds");

        let mut seen = HashSet::new();
        for _ in 0..200 {
            let client = pool.select(NetworkTag::Production);
            assert_eq!(client.network(), NetworkTag::Production);
            seen.insert(client.host().to_string());
        }
        assert_eq!(seen.len(), 2, "both production nodes get picked");
        assert_eq!(pool.select(NetworkTag::Test).host(), "test-1");
        assert_eq!(pool.all_clients().count(), 3);
    }
}
