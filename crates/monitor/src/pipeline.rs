use std::sync::{Arc, Mutex, PoisonError};

use metrics::{counter, gauge};
use nem_push_domain::model::{
    derive_address, Block, MosaicWithDivisibility, NetworkTag, Transfer, TransferNotice,
};
use tracing::{debug, warn};

use crate::{registry::SubscriptionRegistry, resolver::MosaicResolver};

/// What happened to one delivered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Height at or below the network cursor; nothing was scanned.
    Stale,
    Dispatched { transfers: usize, notices: usize },
}

/// Highest dispatched height per network. Each network has its own lock so
/// the check-and-set for one chain never waits on the other.
#[derive(Debug, Default)]
struct HeightCursors {
    production: Mutex<u64>,
    test: Mutex<u64>,
}

impl HeightCursors {
    fn slot(&self, network: NetworkTag) -> &Mutex<u64> {
        match network {
            NetworkTag::Production => &self.production,
            NetworkTag::Test => &self.test,
        }
    }

    fn get(&self, network: NetworkTag) -> u64 {
        *self
            .slot(network)
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves the cursor to `height` if that is an advance. Never decreases.
    fn advance(&self, network: NetworkTag, height: u64) -> bool {
        let mut cursor = self
            .slot(network)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if height <= *cursor {
            return false;
        }
        *cursor = height;
        true
    }
}

/// Consumes blocks from every monitor, filters each network to strictly
/// increasing heights and publishes a notice per matching subscription.
pub struct TransactionDispatcher {
    registry: Arc<SubscriptionRegistry>,
    resolver: Arc<MosaicResolver>,
    cursors: HeightCursors,
}

impl TransactionDispatcher {
    pub fn new(registry: Arc<SubscriptionRegistry>, resolver: Arc<MosaicResolver>) -> Self {
        Self {
            registry,
            resolver,
            cursors: HeightCursors::default(),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn cursor(&self, network: NetworkTag) -> u64 {
        self.cursors.get(network)
    }

    pub async fn on_block(&self, block: Block, network: NetworkTag) -> BlockOutcome {
        if !self.cursors.advance(network, block.height) {
            counter!("monitor_blocks_total", "result" => "stale").increment(1);
            return BlockOutcome::Stale;
        }
        counter!("monitor_blocks_total", "result" => "accepted").increment(1);
        gauge!("monitor_cursor_height", "network" => network.as_str()).set(block.height as f64);

        let mut transfers = 0;
        let mut notices = 0;
        for transaction in &block.transactions {
            let Some(transfer) = transaction.as_transfer() else {
                continue;
            };
            transfers += 1;
            notices += self.dispatch_transfer(transfer, network).await;
        }
        debug!(%network, height = block.height, transfers, notices, "block dispatched");
        BlockOutcome::Dispatched { transfers, notices }
    }

    /// Publishes notices for one transfer and returns how many were queued.
    /// A transfer whose amounts cannot be resolved is skipped on its own.
    pub async fn dispatch_transfer(&self, transfer: &Transfer, network: NetworkTag) -> usize {
        let sender = match derive_address(&transfer.signer, network) {
            Ok(sender) => sender,
            Err(err) => {
                warn!(%network, %err, "skipping transfer with unusable signer");
                return 0;
            }
        };

        let matches = self.registry.matches(sender.as_str(), &transfer.recipient);
        if matches.is_empty() {
            return 0;
        }

        let mosaics = if transfer.is_native_only() {
            vec![MosaicWithDivisibility::native(transfer.amount)]
        } else {
            match self.resolver.resolve(&transfer.mosaics, network).await {
                Ok(mosaics) => mosaics,
                Err(err) => {
                    warn!(%network, %sender, recipient = %transfer.recipient, %err,
                        "skipping notification, mosaics unresolved");
                    return 0;
                }
            }
        };
        let message = transfer.message.clone().unwrap_or_default();

        let mut queued = 0;
        for hit in matches {
            let subscription = hit.subscription;
            // Unnamed subscriptions are labelled with the sender on both sides.
            let label = if subscription.name.is_empty() {
                sender.to_string()
            } else {
                subscription.name
            };
            let side = if hit.is_recipient { "recipient" } else { "sender" };
            let notice = TransferNotice {
                conversation_id: subscription.conversation_id,
                label,
                message: message.clone(),
                mosaics: mosaics.clone(),
                is_recipient: hit.is_recipient,
            };
            match subscription.sink.send(notice) {
                Ok(()) => {
                    counter!("monitor_notifications_total", "side" => side).increment(1);
                    queued += 1;
                }
                Err(_) => warn!(address = %subscription.address, "notification sink closed"),
            }
        }
        queued
    }
}
