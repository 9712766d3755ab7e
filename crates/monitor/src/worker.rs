use std::{sync::Arc, time::Duration};

use metrics::counter;
use thiserror::Error;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use nem_push_domain::{config::ConfigError, model::AddressError, model::NetworkTag};

use crate::{pipeline::TransactionDispatcher, pool::ClientPool, rpc::NodeClient};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("block stream closed by {host}")]
    StreamClosed { host: String },
    #[error("network unavailable after {attempts} attempts: {last_error}")]
    NetworkUnavailable { attempts: u32, last_error: String },
    #[error("no node clients configured for the {0} network")]
    NoClients(NetworkTag),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// Keeps one block subscription to `client` alive for the life of the
/// process, forwarding every block to the dispatcher tagged with the
/// client's network. Stream failures are logged and followed by a fresh
/// subscription after `reconnect_delay`; this future never returns.
pub async fn run_block_monitor(
    client: Arc<dyn NodeClient>,
    dispatcher: Arc<TransactionDispatcher>,
    reconnect_delay: Duration,
) {
    let network = client.network();
    loop {
        match client.subscribe_blocks().await {
            Ok(mut stream) => {
                info!(host = client.host(), %network, "subscribed to block feed");
                loop {
                    match stream.next_block().await {
                        Ok(block) => {
                            debug!(host = client.host(), height = block.height, "block received");
                            dispatcher.on_block(block, network).await;
                        }
                        Err(err) => {
                            counter!("monitor_stream_errors_total", "network" => network.as_str())
                                .increment(1);
                            warn!(
                                host = client.host(), %network, %err,
                                "block feed dropped, resubscribing"
                            );
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                counter!("monitor_stream_errors_total", "network" => network.as_str()).increment(1);
                warn!(
                    host = client.host(), %network, %err,
                    "block feed subscription failed, retrying"
                );
            }
        }
        sleep(reconnect_delay).await;
    }
}

/// Spawns one monitor task per configured node across both networks.
pub fn spawn_monitors(
    pool: &ClientPool,
    dispatcher: Arc<TransactionDispatcher>,
    reconnect_delay: Duration,
) -> Vec<JoinHandle<()>> {
    pool.all_clients()
        .map(|client| {
            tokio::spawn(run_block_monitor(
                Arc::clone(client),
                Arc::clone(&dispatcher),
                reconnect_delay,
            ))
        })
        .collect()
}
