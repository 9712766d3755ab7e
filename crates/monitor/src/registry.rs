use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use nem_push_domain::model::{Address, TransferNotice};
use tokio::sync::mpsc;

/// Delivery side of a subscription: every matching transfer is published
/// here as a [`TransferNotice`].
pub type NotificationSender = mpsc::UnboundedSender<TransferNotice>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<TransferNotice>;

pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub conversation_id: String,
    pub address: Address,
    /// Display name; empty means "fall back to the address".
    pub name: String,
    pub sink: NotificationSender,
}

/// A subscription hit for one transfer side.
#[derive(Debug, Clone)]
pub struct SubscriptionMatch {
    pub subscription: Subscription,
    pub is_recipient: bool,
}

/// Conversation id → address → subscription, guarded by one registry-wide
/// lock. Conversations never map to an empty address set.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<BTreeMap<String, BTreeMap<Address, Subscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<Address, Subscription>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a subscription, replacing any existing one for the same
    /// `(conversation, address)` pair.
    pub fn subscribe(
        &self,
        conversation_id: &str,
        address: Address,
        name: &str,
        sink: NotificationSender,
    ) {
        let subscription = Subscription {
            conversation_id: conversation_id.to_string(),
            address: address.clone(),
            name: name.to_string(),
            sink,
        };
        let mut guard = self.lock();
        let addresses = guard.entry(conversation_id.to_string()).or_default();
        addresses.remove(&address);
        addresses.insert(address, subscription);
    }

    /// Removes the pair; returns whether anything was removed. Absent
    /// entries are a no-op.
    pub fn unsubscribe(&self, conversation_id: &str, address: &Address) -> bool {
        let mut guard = self.lock();
        let Some(addresses) = guard.get_mut(conversation_id) else {
            return false;
        };
        let removed = addresses.remove(address).is_some();
        if addresses.is_empty() {
            guard.remove(conversation_id);
        }
        removed
    }

    /// Snapshot of `(address, name)` pairs for one conversation, ordered by
    /// address.
    pub fn list_for_conversation(&self, conversation_id: &str) -> Vec<(Address, String)> {
        self.lock()
            .get(conversation_id)
            .map(|addresses| {
                addresses
                    .values()
                    .map(|subscription| (subscription.address.clone(), subscription.name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Collects every subscription, across all conversations, watching
    /// `sender` or `recipient`. Within a conversation the sender-side match
    /// precedes the recipient-side match.
    pub fn matches(&self, sender: &str, recipient: &str) -> Vec<SubscriptionMatch> {
        let guard = self.lock();
        let mut found = Vec::new();
        for addresses in guard.values() {
            if let Some(subscription) = addresses.get(sender) {
                found.push(SubscriptionMatch {
                    subscription: subscription.clone(),
                    is_recipient: false,
                });
            }
            if let Some(subscription) = addresses.get(recipient) {
                found.push(SubscriptionMatch {
                    subscription: subscription.clone(),
                    is_recipient: true,
                });
            }
        }
        found
    }

    pub fn conversation_count(&self) -> usize {
        self.lock().len()
    }
}
