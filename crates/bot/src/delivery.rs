use std::{collections::HashMap, time::Duration};

use metrics::counter;
use nem_push_domain::storage::ChannelStore;
use nem_push_monitor::NotificationReceiver;
use nem_push_storage::SeaOrmStorage;
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::format;

const USER_AGENT: &str = "nem-push-bot";
const POST_TIMEOUT: Duration = Duration::from_secs(10);
const LANE_CAPACITY: usize = 256;

/// Free-form text addressed to a channel (confirmations, balance reports).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundText {
    pub channel_id: String,
    pub text: String,
}

pub type OutboxSender = mpsc::UnboundedSender<OutboundText>;
pub type OutboxReceiver = mpsc::UnboundedReceiver<OutboundText>;

pub fn outbox_channel() -> (OutboxSender, OutboxReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook answered with status {0}")]
    Status(u16),
}

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

#[derive(Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(POST_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    pub async fn post(&self, url: &str, content: &str) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(url)
            .json(&MessageBody { content })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        debug!(url, status = status.as_u16(), "webhook accepted message");
        Ok(())
    }
}

/// Drains transfer notices and outbound texts until both queues close.
/// Each channel gets its own lane so a slow webhook only delays its own
/// messages; order within a channel is preserved. Failures are logged and
/// counted; nothing is retried.
pub async fn run_delivery(
    mut notices: NotificationReceiver,
    mut outbox: OutboxReceiver,
    storage: SeaOrmStorage,
    client: WebhookClient,
) {
    info!("webhook delivery started");
    let mut lanes = ChannelLanes::new(storage, client);
    loop {
        tokio::select! {
            Some(notice) = notices.recv() => {
                let text = format::transfer(&notice);
                lanes.push(&notice.conversation_id, text);
            }
            Some(message) = outbox.recv() => {
                lanes.push(&message.channel_id, message.text);
            }
            else => break,
        }
    }
    lanes.drain().await;
    info!("webhook delivery stopped");
}

struct Lane {
    queue: mpsc::Sender<String>,
    worker: JoinHandle<()>,
}

/// Per-channel bounded queues, each drained by its own task.
struct ChannelLanes {
    storage: SeaOrmStorage,
    client: WebhookClient,
    lanes: HashMap<String, Lane>,
}

impl ChannelLanes {
    fn new(storage: SeaOrmStorage, client: WebhookClient) -> Self {
        Self {
            storage,
            client,
            lanes: HashMap::new(),
        }
    }

    fn push(&mut self, channel_id: &str, text: String) {
        if !self.lanes.contains_key(channel_id) {
            let lane = self.open(channel_id);
            self.lanes.insert(channel_id.to_string(), lane);
        }
        let Some(lane) = self.lanes.get(channel_id) else {
            return;
        };
        match lane.queue.try_send(text) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                counter!("bot_webhook_posts_total", "result" => "overflow").increment(1);
                warn!(channel = channel_id, "delivery lane full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                counter!("bot_webhook_posts_total", "result" => "failed").increment(1);
                warn!(channel = channel_id, "delivery lane stopped, reopening");
                self.lanes.remove(channel_id);
            }
        }
    }

    fn open(&self, channel_id: &str) -> Lane {
        let (queue, mut pending) = mpsc::channel::<String>(LANE_CAPACITY);
        let storage = self.storage.clone();
        let client = self.client.clone();
        let channel = channel_id.to_string();
        let worker = tokio::spawn(async move {
            while let Some(text) = pending.recv().await {
                deliver(&storage, &client, &channel, &text).await;
            }
        });
        Lane { queue, worker }
    }

    /// Closes every lane and waits for queued messages to be posted.
    async fn drain(self) {
        for (channel, lane) in self.lanes {
            drop(lane.queue);
            if let Err(err) = lane.worker.await {
                warn!(%channel, %err, "delivery lane aborted");
            }
        }
    }
}

pub async fn deliver(
    storage: &SeaOrmStorage,
    client: &WebhookClient,
    channel_id: &str,
    text: &str,
) {
    let channel = match storage.find_channel(channel_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            counter!("bot_webhook_posts_total", "result" => "unregistered").increment(1);
            debug!(channel = channel_id, "dropping message for unregistered channel");
            return;
        }
        Err(err) => {
            counter!("bot_webhook_posts_total", "result" => "storage_error").increment(1);
            warn!(channel = channel_id, %err, "webhook lookup failed");
            return;
        }
    };
    match client.post(&channel.webhook_url, text).await {
        Ok(()) => {
            counter!("bot_webhook_posts_total", "result" => "delivered").increment(1);
        }
        Err(err) => {
            counter!("bot_webhook_posts_total", "result" => "failed").increment(1);
            warn!(channel = channel_id, %err, "webhook delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use nem_push_domain::model::{MosaicWithDivisibility, TransferNotice};
    use nem_push_domain::storage::ChannelRegistration;
    use nem_push_monitor::notification_channel;
    use serde_json::json;

    async fn storage_with_channel(channel_id: &str, url: String) -> SeaOrmStorage {
        let storage = SeaOrmStorage::connect("sqlite::memory:")
            .await
            .expect("storage inits");
        storage
            .upsert_channel(ChannelRegistration {
                channel_id: channel_id.into(),
                webhook_url: url,
            })
            .await
            .unwrap();
        storage
    }

    #[tokio::test]
    async fn posts_content_with_user_agent() {
        let mut server = Server::new_async().await;
        let hook = server
            .mock("POST", "/hook")
            .match_header("user-agent", USER_AGENT)
            .match_body(Matcher::Json(json!({"content": "hello"})))
            .with_status(204)
            .create_async()
            .await;

        let client = WebhookClient::new().unwrap();
        client
            .post(&format!("{}/hook", server.url()), "hello")
            .await
            .expect("post succeeds");
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_post_surfaces_status() {
        let mut server = Server::new_async().await;
        let _hook = server
            .mock("POST", "/hook")
            .with_status(404)
            .create_async()
            .await;

        let err = WebhookClient::new()
            .unwrap()
            .post(&format!("{}/hook", server.url()), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status(404)));
    }

    #[tokio::test]
    async fn routes_notices_and_texts_to_registered_webhooks() {
        let mut server = Server::new_async().await;
        let notice_post = server
            .mock("POST", "/c1")
            .match_body(Matcher::Json(json!({
                "content": "Received XEM / mosaics\nshop\nnem:xem  0.000005\n"
            })))
            .with_status(200)
            .create_async()
            .await;
        let text_post = server
            .mock("POST", "/c1")
            .match_body(Matcher::Json(json!({"content": "Address registered: TAAA"})))
            .with_status(200)
            .create_async()
            .await;
        let storage = storage_with_channel("c1", format!("{}/c1", server.url())).await;

        let (notice_tx, notice_rx) = notification_channel();
        let (outbox_tx, outbox_rx) = outbox_channel();
        notice_tx
            .send(TransferNotice {
                conversation_id: "c1".into(),
                label: "shop".into(),
                message: String::new(),
                mosaics: vec![MosaicWithDivisibility::native(5)],
                is_recipient: true,
            })
            .unwrap();
        outbox_tx
            .send(OutboundText {
                channel_id: "c1".into(),
                text: "Address registered: TAAA".into(),
            })
            .unwrap();
        // Unregistered channels are dropped without a request.
        outbox_tx
            .send(OutboundText {
                channel_id: "other".into(),
                text: "ignored".into(),
            })
            .unwrap();
        drop(notice_tx);
        drop(outbox_tx);

        run_delivery(notice_rx, outbox_rx, storage, WebhookClient::new().unwrap()).await;

        notice_post.assert_async().await;
        text_post.assert_async().await;
    }

    #[tokio::test]
    async fn stalled_webhook_does_not_block_other_channels() {
        // Accepts connections through the backlog but never answers.
        let silent = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let silent_url = format!("http://{}/hook", silent.local_addr().unwrap());

        let mut server = Server::new_async().await;
        let fast = server
            .mock("POST", "/fast")
            .with_status(200)
            .create_async()
            .await;
        let storage = storage_with_channel("slow", silent_url).await;
        storage
            .upsert_channel(ChannelRegistration {
                channel_id: "fast".into(),
                webhook_url: format!("{}/fast", server.url()),
            })
            .await
            .unwrap();

        let (_notice_tx, notice_rx) = notification_channel();
        let (outbox_tx, outbox_rx) = outbox_channel();
        for channel_id in ["slow", "fast"] {
            outbox_tx
                .send(OutboundText {
                    channel_id: channel_id.into(),
                    text: "ping".into(),
                })
                .unwrap();
        }
        let delivery = tokio::spawn(run_delivery(
            notice_rx,
            outbox_rx,
            storage,
            WebhookClient::new().unwrap(),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !fast.matched_async().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("fast channel delivered while slow one hangs");
        delivery.abort();
    }
}
