use std::{sync::Arc, time::Duration};

use nem_push_domain::{
    config::WatcherConfig,
    model::{Address, MosaicWithDivisibility, NetworkTag},
    services::DivisibilityCache,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    pipeline::TransactionDispatcher,
    pool::ClientPool,
    registry::{NotificationSender, SubscriptionRegistry},
    resolver::MosaicResolver,
    rpc::{NisClient, NodeClient},
    worker::{spawn_monitors, MonitorError},
};

/// Holdings lookup result for one subscribed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceOutcome {
    Resolved(Vec<MosaicWithDivisibility>),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub address: Address,
    /// Subscription name, or the address when the name is empty.
    pub label: String,
    pub outcome: BalanceOutcome,
}

/// Entry point for command handlers: owns the client pool, the registry and
/// the dispatcher, and validates every address before touching either.
pub struct Watcher {
    pool: Arc<ClientPool>,
    resolver: Arc<MosaicResolver>,
    dispatcher: Arc<TransactionDispatcher>,
}

impl Watcher {
    pub fn new(pool: Arc<ClientPool>, cache: Arc<DivisibilityCache>, lookup_retries: u32) -> Self {
        let resolver = MosaicResolver::new(Arc::clone(&pool), cache, lookup_retries);
        Self::with_resolver(Arc::new(resolver))
    }

    pub fn with_resolver(resolver: Arc<MosaicResolver>) -> Self {
        let dispatcher = Arc::new(TransactionDispatcher::new(
            Arc::new(SubscriptionRegistry::new()),
            Arc::clone(&resolver),
        ));
        Self {
            pool: Arc::clone(resolver.pool()),
            resolver,
            dispatcher,
        }
    }

    /// Builds one NIS client per configured host. An empty host list for
    /// either network is fatal.
    pub fn from_config(
        config: &WatcherConfig,
        cache: Arc<DivisibilityCache>,
    ) -> Result<Self, MonitorError> {
        let mut clients: Vec<Arc<dyn NodeClient>> = Vec::new();
        for network in NetworkTag::ALL {
            for host in config.hosts(network) {
                let client = NisClient::new(
                    host.as_str(),
                    config.node_port(),
                    network,
                    config.poll_interval(),
                )?;
                clients.push(Arc::new(client));
            }
        }
        let pool = Arc::new(ClientPool::new(clients)?);
        info!(
            production = pool.clients(NetworkTag::Production).len(),
            test = pool.clients(NetworkTag::Test).len(),
            "node pool ready"
        );
        Ok(Self::new(pool, cache, config.lookup_retries()))
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.dispatcher.registry()
    }

    pub fn spawn_monitors(&self, reconnect_delay: Duration) -> Vec<JoinHandle<()>> {
        spawn_monitors(&self.pool, Arc::clone(&self.dispatcher), reconnect_delay)
    }

    /// Validates `raw_address` and (re)installs the subscription. Returns
    /// the normalized address.
    pub fn subscribe_transaction(
        &self,
        conversation_id: &str,
        raw_address: &str,
        name: &str,
        sink: NotificationSender,
    ) -> Result<Address, MonitorError> {
        let address = Address::parse(raw_address)?;
        debug!(conversation = conversation_id, %address, name, "subscribe");
        self.registry()
            .subscribe(conversation_id, address.clone(), name, sink);
        Ok(address)
    }

    /// Returns the normalized address and whether a subscription existed.
    pub fn unsubscribe_transaction(
        &self,
        conversation_id: &str,
        raw_address: &str,
    ) -> Result<(Address, bool), MonitorError> {
        let address = Address::parse(raw_address)?;
        debug!(conversation = conversation_id, %address, "unsubscribe");
        let removed = self.registry().unsubscribe(conversation_id, &address);
        Ok((address, removed))
    }

    pub fn list_addresses(&self, conversation_id: &str) -> Vec<(Address, String)> {
        self.registry().list_for_conversation(conversation_id)
    }

    /// Looks up every subscribed address of the conversation concurrently.
    /// Reports come back in list order; a failure affects only its address.
    pub async fn balance(&self, conversation_id: &str) -> Vec<BalanceReport> {
        let tasks: Vec<_> = self
            .list_addresses(conversation_id)
            .into_iter()
            .map(|(address, name)| {
                let resolver = Arc::clone(&self.resolver);
                let lookup = address.clone();
                let handle = tokio::spawn(async move { resolver.balance(&lookup).await });
                (address, name, handle)
            })
            .collect();

        let mut reports = Vec::with_capacity(tasks.len());
        for (address, name, handle) in tasks {
            let outcome = match handle.await {
                Ok(Ok(holdings)) => BalanceOutcome::Resolved(holdings),
                Ok(Err(err)) => {
                    warn!(conversation = conversation_id, %address, %err, "balance lookup failed");
                    BalanceOutcome::Unavailable(err.to_string())
                }
                Err(err) => {
                    warn!(conversation = conversation_id, %address, %err, "balance task aborted");
                    BalanceOutcome::Unavailable(err.to_string())
                }
            };
            let label = if name.is_empty() {
                address.to_string()
            } else {
                name
            };
            reports.push(BalanceReport {
                address,
                label,
                outcome,
            });
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::notification_channel;
    use crate::resolver::tests::{pool_with, LookupNode};
    use nem_push_domain::model::{AddressError, MosaicAmount, MosaicId};

    fn watcher(node: Arc<LookupNode>, retries: u32) -> Watcher {
        let cache = Arc::new(DivisibilityCache::new());
        let resolver =
            MosaicResolver::new(pool_with(node), cache, retries).with_retry_delay(Duration::ZERO);
        Watcher::with_resolver(Arc::new(resolver))
    }

    #[test]
    fn invalid_address_leaves_registry_untouched() {
        let watcher = watcher(Arc::new(LookupNode::new(NetworkTag::Test)), 0);
        let (tx, _rx) = notification_channel();

        let err = watcher
            .subscribe_transaction("c1", "XABCDEF", "", tx)
            .unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidAddress(AddressError::InvalidAddress(_))
        ));
        assert!(watcher.unsubscribe_transaction("c1", "QZZ").is_err());
        assert_eq!(watcher.registry().conversation_count(), 0);
    }

    #[test]
    fn subscribe_normalizes_and_lists() {
        let watcher = watcher(Arc::new(LookupNode::new(NetworkTag::Test)), 0);
        let (tx, _rx) = notification_channel();

        let address = watcher
            .subscribe_transaction("c1", "tbob-abcd", "bob", tx)
            .unwrap();
        assert_eq!(address.as_str(), "TBOBABCD");
        assert_eq!(
            watcher.list_addresses("c1"),
            vec![(address.clone(), "bob".to_string())]
        );

        let (removed_address, removed) = watcher
            .unsubscribe_transaction("c1", "TBOB-ABCD")
            .unwrap();
        assert_eq!(removed_address, address);
        assert!(removed);
        assert!(!watcher.unsubscribe_transaction("c1", "TBOBABCD").unwrap().1);
    }

    #[tokio::test]
    async fn balance_reports_each_address_in_order() {
        let mut node = LookupNode::new(NetworkTag::Test).with_divisibility("foo:bar", 2);
        node.owned = vec![
            MosaicAmount::new(MosaicId::new("nem", "xem"), 2_000_000),
            MosaicAmount::new(MosaicId::new("foo", "bar"), 150),
        ];
        let watcher = watcher(Arc::new(node), 0);
        let (tx, _rx) = notification_channel();
        watcher
            .subscribe_transaction("c1", "TAAA", "", tx.clone())
            .unwrap();
        watcher
            .subscribe_transaction("c1", "TBBB", "savings", tx)
            .unwrap();

        let reports = watcher.balance("c1").await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].label, "TAAA");
        assert_eq!(reports[1].label, "savings");
        let expected = BalanceOutcome::Resolved(vec![
            MosaicWithDivisibility::new("nem:xem", 2_000_000, 6),
            MosaicWithDivisibility::new("foo:bar", 150, 2),
        ]);
        assert_eq!(reports[0].outcome, expected);
        assert_eq!(reports[1].outcome, expected);
    }

    #[tokio::test]
    async fn balance_failure_is_reported_per_address() {
        let watcher = watcher(Arc::new(LookupNode::new(NetworkTag::Test).failing(u32::MAX)), 1);
        let (tx, _rx) = notification_channel();
        watcher.subscribe_transaction("c1", "TAAA", "", tx).unwrap();

        let reports = watcher.balance("c1").await;

        assert!(matches!(reports[0].outcome, BalanceOutcome::Unavailable(_)));
        assert!(watcher.balance("unknown").await.is_empty());
    }
}
