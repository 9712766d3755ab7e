use std::{sync::Arc, time::Duration};

use metrics::counter;
use nem_push_domain::{
    model::{Address, MosaicAmount, MosaicWithDivisibility, NetworkTag},
    services::DivisibilityCache,
};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{pool::ClientPool, worker::MonitorError};

pub const DEFAULT_LOOKUP_RETRIES: u32 = 10;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Turns raw mosaic quantities into renderable amounts, filling the shared
/// divisibility cache on demand.
pub struct MosaicResolver {
    pool: Arc<ClientPool>,
    cache: Arc<DivisibilityCache>,
    max_retries: u32,
    retry_delay: Duration,
}

impl MosaicResolver {
    pub fn new(pool: Arc<ClientPool>, cache: Arc<DivisibilityCache>, max_retries: u32) -> Self {
        Self {
            pool,
            cache,
            max_retries,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn cache(&self) -> &DivisibilityCache {
        &self.cache
    }

    /// Resolves every mosaic of one transfer or balance. A failed lookup
    /// restarts the whole list against a freshly selected node; after
    /// `max_retries` restarts the call fails with `NetworkUnavailable`.
    pub async fn resolve(
        &self,
        mosaics: &[MosaicAmount],
        network: NetworkTag,
    ) -> Result<Vec<MosaicWithDivisibility>, MonitorError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.resolve_once(mosaics, network).await {
                Ok(resolved) => return Ok(resolved),
                Err(err) if attempts <= self.max_retries => {
                    counter!("monitor_mosaic_lookups_total", "result" => "retry").increment(1);
                    debug!(%network, attempts, %err, "mosaic lookup failed, retrying");
                    sleep(self.retry_delay).await;
                }
                Err(err) => {
                    counter!("monitor_mosaic_lookups_total", "result" => "exhausted").increment(1);
                    warn!(%network, attempts, %err, "mosaic lookup retries exhausted");
                    return Err(MonitorError::NetworkUnavailable {
                        attempts,
                        last_error: err.to_string(),
                    });
                }
            }
        }
    }

    async fn resolve_once(
        &self,
        mosaics: &[MosaicAmount],
        network: NetworkTag,
    ) -> Result<Vec<MosaicWithDivisibility>, MonitorError> {
        let client = self.pool.select(network);
        let mut resolved = Vec::with_capacity(mosaics.len());
        for amount in mosaics {
            let full_name = amount.mosaic.canonical();
            let divisibility = match self.cache.get(&full_name) {
                Some(divisibility) => {
                    counter!("monitor_mosaic_lookups_total", "result" => "hit").increment(1);
                    divisibility
                }
                None => match client.mosaic_divisibility(&amount.mosaic).await? {
                    Some(divisibility) => {
                        counter!("monitor_mosaic_lookups_total", "result" => "fetched")
                            .increment(1);
                        self.cache.insert_if_absent(&full_name, divisibility)
                    }
                    // Unknown definitions render as whole units and stay uncached.
                    None => 0,
                },
            };
            resolved.push(MosaicWithDivisibility::new(
                full_name,
                amount.quantity,
                divisibility,
            ));
        }
        Ok(resolved)
    }

    /// Current holdings of `address`, with the same retry bound applied to
    /// the account lookup before resolving divisibilities.
    pub async fn balance(
        &self,
        address: &Address,
    ) -> Result<Vec<MosaicWithDivisibility>, MonitorError> {
        let network = address.network();
        let mut attempts = 0;
        let owned = loop {
            attempts += 1;
            match self.pool.select(network).account_mosaics(address).await {
                Ok(owned) => break owned,
                Err(err) if attempts <= self.max_retries => {
                    debug!(%address, attempts, %err, "balance lookup failed, retrying");
                    sleep(self.retry_delay).await;
                }
                Err(err) => {
                    warn!(%address, attempts, %err, "balance lookup retries exhausted");
                    return Err(MonitorError::NetworkUnavailable {
                        attempts,
                        last_error: err.to_string(),
                    });
                }
            }
        };
        self.resolve(&owned, network).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::rpc::{BlockStream, NodeClient};
    use async_trait::async_trait;
    use nem_push_domain::model::MosaicId;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Node double with scripted lookup failures and call counters.
    pub(crate) struct LookupNode {
        pub network: NetworkTag,
        pub divisibilities: HashMap<String, u8>,
        pub owned: Vec<MosaicAmount>,
        pub failures_left: AtomicU32,
        pub definition_calls: AtomicUsize,
        pub account_calls: AtomicUsize,
    }

    impl LookupNode {
        pub(crate) fn new(network: NetworkTag) -> Self {
            Self {
                network,
                divisibilities: HashMap::new(),
                owned: Vec::new(),
                failures_left: AtomicU32::new(0),
                definition_calls: AtomicUsize::new(0),
                account_calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn with_divisibility(mut self, full_name: &str, divisibility: u8) -> Self {
            self.divisibilities.insert(full_name.to_string(), divisibility);
            self
        }

        pub(crate) fn failing(self, times: u32) -> Self {
            self.failures_left.store(times, Ordering::SeqCst);
            self
        }

        fn take_failure(&self) -> bool {
            self.failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl NodeClient for LookupNode {
        fn host(&self) -> &str {
            "lookup"
        }

        fn network(&self) -> NetworkTag {
            self.network
        }

        async fn subscribe_blocks(&self) -> Result<Box<dyn BlockStream>, MonitorError> {
            Err(MonitorError::Rpc("no feed".into()))
        }

        async fn account_mosaics(
            &self,
            _address: &Address,
        ) -> Result<Vec<MosaicAmount>, MonitorError> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_failure() {
                return Err(MonitorError::Rpc("timeout".into()));
            }
            Ok(self.owned.clone())
        }

        async fn mosaic_divisibility(
            &self,
            mosaic: &MosaicId,
        ) -> Result<Option<u8>, MonitorError> {
            self.definition_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_failure() {
                return Err(MonitorError::Rpc("timeout".into()));
            }
            Ok(self.divisibilities.get(&mosaic.canonical()).copied())
        }
    }

    pub(crate) fn pool_with(test_node: Arc<LookupNode>) -> Arc<ClientPool> {
        let production: Arc<dyn NodeClient> = Arc::new(LookupNode::new(NetworkTag::Production));
        Arc::new(
            ClientPool::new(vec![test_node as Arc<dyn NodeClient>, production]).expect("pool"),
        )
    }

    fn resolver(node: Arc<LookupNode>, retries: u32) -> MosaicResolver {
        MosaicResolver::new(pool_with(node), Arc::new(DivisibilityCache::default()), retries)
            .with_retry_delay(Duration::ZERO)
    }

    fn foo_bar(quantity: u64) -> MosaicAmount {
        MosaicAmount::new(MosaicId::new("foo", "bar"), quantity)
    }

    #[tokio::test]
    async fn retries_transient_failure_and_renders_amount() {
        let node = Arc::new(
            LookupNode::new(NetworkTag::Test)
                .with_divisibility("foo:bar", 2)
                .failing(1),
        );
        let resolver = resolver(node.clone(), DEFAULT_LOOKUP_RETRIES);

        let resolved = resolver
            .resolve(&[foo_bar(12345)], NetworkTag::Test)
            .await
            .expect("second attempt succeeds");

        assert_eq!(resolved, vec![MosaicWithDivisibility::new("foo:bar", 12345, 2)]);
        assert_eq!(resolved[0].rendered_amount(), "123.45");
        assert_eq!(node.definition_calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cache().get("foo:bar"), Some(2));
    }

    #[tokio::test]
    async fn cached_names_skip_the_network() {
        let node = Arc::new(LookupNode::new(NetworkTag::Test));
        let resolver = resolver(node.clone(), DEFAULT_LOOKUP_RETRIES);
        resolver.cache().insert_if_absent("foo:bar", 3);

        let resolved = resolver
            .resolve(
                &[
                    foo_bar(7),
                    MosaicAmount::new(MosaicId::new("nem", "xem"), 1_500_000),
                ],
                NetworkTag::Test,
            )
            .await
            .unwrap();

        assert_eq!(
            resolved,
            vec![
                MosaicWithDivisibility::new("foo:bar", 7, 3),
                MosaicWithDivisibility::new("nem:xem", 1_500_000, 6),
            ]
        );
        assert_eq!(node.definition_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhausting_retries_reports_network_unavailable() {
        let node = Arc::new(LookupNode::new(NetworkTag::Test).failing(u32::MAX));
        let resolver = resolver(node.clone(), 2);

        let err = resolver
            .resolve(&[foo_bar(1)], NetworkTag::Test)
            .await
            .unwrap_err();

        assert!(matches!(err, MonitorError::NetworkUnavailable { attempts: 3, .. }));
        assert_eq!(node.definition_calls.load(Ordering::SeqCst), 3);
        assert!(!resolver.cache().contains("foo:bar"));
    }

    #[tokio::test]
    async fn unknown_definition_renders_whole_units_uncached() {
        let node = Arc::new(LookupNode::new(NetworkTag::Test));
        let resolver = resolver(node, 0);

        let resolved = resolver.resolve(&[foo_bar(9)], NetworkTag::Test).await.unwrap();

        assert_eq!(resolved[0].divisibility, 0);
        assert!(!resolver.cache().contains("foo:bar"));
    }

    #[tokio::test]
    async fn balance_retries_account_lookup() {
        let mut node = LookupNode::new(NetworkTag::Test).with_divisibility("foo:bar", 1);
        node.owned = vec![foo_bar(25)];
        let node = Arc::new(node.failing(2));
        let resolver = resolver(node.clone(), DEFAULT_LOOKUP_RETRIES);
        let address = Address::parse("TACCOUNT").unwrap();

        let holdings = resolver.balance(&address).await.unwrap();

        assert_eq!(holdings, vec![MosaicWithDivisibility::new("foo:bar", 25, 1)]);
        assert_eq!(node.account_calls.load(Ordering::SeqCst), 3);
    }
}
