//! Persistence contracts for channel registrations and subscribed addresses.

use async_trait::async_trait;
use thiserror::Error;

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// A conversation and the webhook its notifications are delivered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistration {
    pub channel_id: String,
    pub webhook_url: String,
}

/// A persisted `(channel, address) -> name` subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubscription {
    pub channel_id: String,
    pub address: String,
    pub name: String,
}

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn upsert_channel(&self, channel: ChannelRegistration) -> StorageResult<()>;
    async fn remove_channel(&self, channel_id: &str) -> StorageResult<()>;
    async fn find_channel(&self, channel_id: &str) -> StorageResult<Option<ChannelRegistration>>;
    async fn load_channels(&self) -> StorageResult<Vec<ChannelRegistration>>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn upsert_subscription(&self, subscription: StoredSubscription) -> StorageResult<()>;
    async fn remove_subscription(&self, channel_id: &str, address: &str) -> StorageResult<()>;
    async fn load_subscriptions(&self) -> StorageResult<Vec<StoredSubscription>>;
}
