//! Ledger watcher: node clients, block monitors, the subscription registry
//! and the dispatcher that turns confirmed transfers into notices. Embedded
//! by the bot binary; has no entrypoint of its own.

pub mod pipeline;
pub mod pool;
pub mod registry;
pub mod resolver;
pub mod rpc;
pub mod watcher;
pub mod worker;

pub use pipeline::{BlockOutcome, TransactionDispatcher};
pub use pool::ClientPool;
pub use registry::{
    notification_channel, NotificationReceiver, NotificationSender, Subscription,
    SubscriptionRegistry,
};
pub use resolver::{MosaicResolver, DEFAULT_LOOKUP_RETRIES};
pub use rpc::{BlockStream, NisClient, NodeClient};
pub use watcher::{BalanceOutcome, BalanceReport, Watcher};
pub use worker::{run_block_monitor, spawn_monitors, MonitorError};
