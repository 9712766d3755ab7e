use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use nem_push_domain::model::{Address, Block, MosaicAmount, MosaicId, NetworkTag};
use tokio::time::sleep;
use tracing::debug;

use crate::worker::MonitorError;

mod types;

pub use types::{BlockDto, TransactionDto, MULTISIG_TYPE, TRANSFER_TYPE};
use types::{
    BlockHeightRequest, ChainHeightDto, MosaicDefinitionPageDto, OwnedMosaicsDto,
};

const USER_AGENT: &str = "nem-push-bot";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFINITION_PAGE_SIZE: u32 = 100;

/// Handle to one ledger node: a block feed plus request/response lookups.
#[async_trait]
pub trait NodeClient: Send + Sync {
    fn host(&self) -> &str;
    fn network(&self) -> NetworkTag;

    /// Opens a fresh block feed. The returned stream ends with an error on
    /// any transport failure; callers re-subscribe.
    async fn subscribe_blocks(&self) -> Result<Box<dyn BlockStream>, MonitorError>;

    async fn account_mosaics(&self, address: &Address) -> Result<Vec<MosaicAmount>, MonitorError>;

    /// Returns the mosaic's divisibility, or `None` when the node has no
    /// definition for it.
    async fn mosaic_divisibility(&self, mosaic: &MosaicId) -> Result<Option<u8>, MonitorError>;
}

#[async_trait]
pub trait BlockStream: Send {
    async fn next_block(&mut self) -> Result<Block, MonitorError>;
}

/// NIS REST client (`http://{host}:{port}`).
pub struct NisClient {
    inner: Arc<NisHttp>,
    poll_interval: Duration,
}

struct NisHttp {
    host: String,
    network: NetworkTag,
    base_url: String,
    http: reqwest::Client,
}

impl NisClient {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        network: NetworkTag,
        poll_interval: Duration,
    ) -> Result<Self, MonitorError> {
        let host = host.into();
        let base_url = format!("http://{host}:{port}");
        Self::with_base_url(host, base_url, network, poll_interval)
    }

    pub fn with_base_url(
        host: impl Into<String>,
        base_url: impl Into<String>,
        network: NetworkTag,
        poll_interval: Duration,
    ) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            inner: Arc::new(NisHttp {
                host: host.into(),
                network,
                base_url: base_url.into().trim_end_matches('/').to_string(),
                http,
            }),
            poll_interval,
        })
    }
}

impl NisHttp {
    async fn chain_height(&self) -> Result<u64, MonitorError> {
        let response: ChainHeightDto = self
            .http
            .get(format!("{}/chain/height", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.height)
    }

    async fn block_at(&self, height: u64) -> Result<Block, MonitorError> {
        let block: BlockDto = self
            .http
            .post(format!("{}/block/at/public", self.base_url))
            .json(&BlockHeightRequest { height })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(block.into())
    }

    /// One page of the namespace's definitions, continuing after the entry
    /// with meta id `after` when given.
    async fn definition_page(
        &self,
        namespace: &str,
        after: Option<u64>,
    ) -> Result<MosaicDefinitionPageDto, MonitorError> {
        let mut query = vec![
            ("namespace", namespace.to_string()),
            ("pageSize", DEFINITION_PAGE_SIZE.to_string()),
        ];
        if let Some(id) = after {
            query.push(("id", id.to_string()));
        }
        let page = self
            .http
            .get(format!("{}/namespace/mosaic/definition/page", self.base_url))
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }
}

#[async_trait]
impl NodeClient for NisClient {
    fn host(&self) -> &str {
        &self.inner.host
    }

    fn network(&self) -> NetworkTag {
        self.inner.network
    }

    async fn subscribe_blocks(&self) -> Result<Box<dyn BlockStream>, MonitorError> {
        let tip = self.inner.chain_height().await?;
        debug!(host = %self.inner.host, tip, "block feed opened");
        Ok(Box::new(PollingBlockStream {
            node: Arc::clone(&self.inner),
            next_height: tip,
            poll_interval: self.poll_interval,
        }))
    }

    async fn account_mosaics(&self, address: &Address) -> Result<Vec<MosaicAmount>, MonitorError> {
        let owned: OwnedMosaicsDto = self
            .inner
            .http
            .get(format!("{}/account/mosaic/owned", self.inner.base_url))
            .query(&[("address", address.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(owned.data.into_iter().map(Into::into).collect())
    }

    async fn mosaic_divisibility(&self, mosaic: &MosaicId) -> Result<Option<u8>, MonitorError> {
        let mut after = None;
        loop {
            let page = self.inner.definition_page(&mosaic.namespace, after).await?;
            let full_page = page.data.len() >= DEFINITION_PAGE_SIZE as usize;
            after = page.data.last().map(|entry| entry.meta.id);
            if let Some(entry) = page
                .data
                .into_iter()
                .find(|entry| entry.mosaic.id.name == mosaic.name)
            {
                return Ok(entry.mosaic.divisibility());
            }
            if !full_page {
                return Ok(None);
            }
        }
    }
}

/// Block feed over NIS polling: starts at the tip observed on subscribe and
/// yields every following height in order.
struct PollingBlockStream {
    node: Arc<NisHttp>,
    next_height: u64,
    poll_interval: Duration,
}

#[async_trait]
impl BlockStream for PollingBlockStream {
    async fn next_block(&mut self) -> Result<Block, MonitorError> {
        loop {
            let tip = self.node.chain_height().await?;
            if tip >= self.next_height {
                let block = self.node.block_at(self.next_height).await?;
                self.next_height += 1;
                return Ok(block);
            }
            sleep(self.poll_interval).await;
        }
    }
}
