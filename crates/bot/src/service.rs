use std::sync::Arc;

use nem_push_domain::model::{Address, AddressError};
use nem_push_domain::storage::{
    ChannelRegistration, ChannelStore, StorageError, StoredSubscription, SubscriptionStore,
};
use nem_push_monitor::{BalanceOutcome, MonitorError, NotificationSender, Watcher};
use nem_push_storage::SeaOrmStorage;
use strum_macros::AsRefStr;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::delivery::{OutboundText, OutboxSender};
use crate::format;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("invalid webhook url `{0}`")]
    InvalidWebhook(String),
    #[error("channel `{0}` has no registered webhook")]
    ChannelNotRegistered(String),
    #[error("no addresses subscribed in channel `{0}`")]
    NothingSubscribed(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("watcher failure: {0}")]
    Watcher(String),
}

impl From<MonitorError> for ServiceError {
    fn from(value: MonitorError) -> Self {
        match value {
            MonitorError::InvalidAddress(err) => Self::InvalidAddress(err),
            other => Self::Watcher(other.to_string()),
        }
    }
}

/// Command names used as the `command` metric label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    Register,
    Unregister,
    Subscribe,
    Unsubscribe,
    Balance,
    List,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Channels with a registered webhook.
    pub channels: usize,
    pub armed: usize,
    pub skipped: usize,
}

/// Channel commands: persists registrations, drives the watcher and queues
/// the replies that go back to the channel webhook.
pub struct BotService {
    storage: SeaOrmStorage,
    watcher: Arc<Watcher>,
    notices: NotificationSender,
    outbox: OutboxSender,
}

impl BotService {
    pub fn new(
        storage: SeaOrmStorage,
        watcher: Arc<Watcher>,
        notices: NotificationSender,
        outbox: OutboxSender,
    ) -> Self {
        Self {
            storage,
            watcher,
            notices,
            outbox,
        }
    }

    pub async fn register(&self, channel_id: &str, webhook_url: &str) -> Result<(), ServiceError> {
        let url = webhook_url.trim();
        validate_webhook(url)?;
        self.storage
            .upsert_channel(ChannelRegistration {
                channel_id: channel_id.to_string(),
                webhook_url: url.to_string(),
            })
            .await?;
        info!(channel = channel_id, "channel registered");
        Ok(())
    }

    /// Drops the webhook. Subscriptions stay persisted and armed.
    pub async fn unregister(&self, channel_id: &str) -> Result<(), ServiceError> {
        self.storage.remove_channel(channel_id).await?;
        info!(channel = channel_id, "channel unregistered");
        Ok(())
    }

    pub async fn subscribe(
        &self,
        channel_id: &str,
        raw_address: &str,
        name: &str,
    ) -> Result<Address, ServiceError> {
        self.ensure_registered(channel_id).await?;
        // Persist before arming so a failed write leaves no in-memory entry.
        let address = Address::parse(raw_address)?;
        self.storage
            .upsert_subscription(StoredSubscription {
                channel_id: channel_id.to_string(),
                address: address.to_string(),
                name: name.to_string(),
            })
            .await?;
        let address = self.arm(channel_id, address.as_str(), name)?;
        self.reply(channel_id, format::confirmation(format::SUBSCRIBED, &address));
        Ok(address)
    }

    pub async fn unsubscribe(
        &self,
        channel_id: &str,
        raw_address: &str,
    ) -> Result<(Address, bool), ServiceError> {
        self.ensure_registered(channel_id).await?;
        let address = Address::parse(raw_address)?;
        self.storage
            .remove_subscription(channel_id, address.as_str())
            .await?;
        let (address, removed) = self
            .watcher
            .unsubscribe_transaction(channel_id, address.as_str())?;
        self.reply(channel_id, format::confirmation(format::UNSUBSCRIBED, &address));
        Ok((address, removed))
    }

    /// Starts the lookup in the background and returns the number of
    /// addresses whose reports will be posted to the channel.
    pub async fn balance(&self, channel_id: &str) -> Result<usize, ServiceError> {
        self.ensure_registered(channel_id).await?;
        let pending = self.watcher.list_addresses(channel_id).len();
        if pending == 0 {
            return Err(ServiceError::NothingSubscribed(channel_id.to_string()));
        }

        let watcher = Arc::clone(&self.watcher);
        let outbox = self.outbox.clone();
        let channel = channel_id.to_string();
        tokio::spawn(async move {
            for report in watcher.balance(&channel).await {
                let text = match &report.outcome {
                    BalanceOutcome::Resolved(holdings) => format::balance(&report.label, holdings),
                    BalanceOutcome::Unavailable(_) => format::balance_failure(&report.address),
                };
                if outbox
                    .send(OutboundText {
                        channel_id: channel.clone(),
                        text,
                    })
                    .is_err()
                {
                    warn!(channel = %channel, "outbox closed, dropping balance report");
                    break;
                }
            }
        });
        Ok(pending)
    }

    pub async fn list(&self, channel_id: &str) -> Result<Vec<(Address, String)>, ServiceError> {
        self.ensure_registered(channel_id).await?;
        Ok(self.watcher.list_addresses(channel_id))
    }

    /// Re-arms every persisted subscription without writing to storage or
    /// posting confirmations. Rows that no longer parse are skipped.
    pub async fn restore(&self) -> Result<RestoreSummary, ServiceError> {
        let mut summary = RestoreSummary {
            channels: self.storage.load_channels().await?.len(),
            ..RestoreSummary::default()
        };
        for row in self.storage.load_subscriptions().await? {
            match self.arm(&row.channel_id, &row.address, &row.name) {
                Ok(_) => summary.armed += 1,
                Err(err) => {
                    warn!(channel = %row.channel_id, address = %row.address, %err,
                        "skipping persisted subscription");
                    summary.skipped += 1;
                }
            }
        }
        Ok(summary)
    }

    fn arm(
        &self,
        channel_id: &str,
        raw_address: &str,
        name: &str,
    ) -> Result<Address, ServiceError> {
        let sink = self.notices.clone();
        let address = self
            .watcher
            .subscribe_transaction(channel_id, raw_address, name, sink)?;
        Ok(address)
    }

    async fn ensure_registered(&self, channel_id: &str) -> Result<(), ServiceError> {
        match self.storage.find_channel(channel_id).await? {
            Some(_) => Ok(()),
            None => Err(ServiceError::ChannelNotRegistered(channel_id.to_string())),
        }
    }

    fn reply(&self, channel_id: &str, text: String) {
        let message = OutboundText {
            channel_id: channel_id.to_string(),
            text,
        };
        if self.outbox.send(message).is_err() {
            debug!(channel = channel_id, "outbox closed, reply dropped");
        }
    }
}

fn validate_webhook(url: &str) -> Result<(), ServiceError> {
    match reqwest::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(ServiceError::InvalidWebhook(url.to_string())),
    }
}
