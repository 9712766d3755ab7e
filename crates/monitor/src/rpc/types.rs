//! Wire types returned by NIS nodes and their conversion into the domain model.

use nem_push_domain::model::{Block, MosaicAmount, MosaicId, Transaction, Transfer};
use serde::{Deserialize, Serialize};

pub const TRANSFER_TYPE: u32 = 0x0101;
pub const MULTISIG_TYPE: u32 = 0x1004;

#[derive(Debug, Deserialize)]
pub struct ChainHeightDto {
    pub height: u64,
}

#[derive(Debug, Serialize)]
pub struct BlockHeightRequest {
    pub height: u64,
}

#[derive(Debug, Deserialize)]
pub struct BlockDto {
    pub height: u64,
    #[serde(default)]
    pub transactions: Vec<TransactionDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    #[serde(rename = "type")]
    pub tx_type: u32,
    #[serde(default)]
    pub signer: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub message: Option<MessageDto>,
    #[serde(default)]
    pub mosaics: Option<Vec<MosaicDto>>,
    #[serde(default)]
    pub other_trans: Option<Box<TransactionDto>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MessageDto {
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MosaicDto {
    pub mosaic_id: MosaicIdDto,
    pub quantity: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MosaicIdDto {
    pub namespace_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OwnedMosaicsDto {
    #[serde(default)]
    pub data: Vec<MosaicDto>,
}

#[derive(Debug, Deserialize)]
pub struct MosaicDefinitionPageDto {
    #[serde(default)]
    pub data: Vec<MosaicDefinitionEntryDto>,
}

#[derive(Debug, Deserialize)]
pub struct MosaicDefinitionEntryDto {
    pub meta: PageMetaDto,
    pub mosaic: MosaicDefinitionDto,
}

/// Paging cursor; the next page is requested with `id` set to the last
/// entry's value.
#[derive(Debug, Deserialize)]
pub struct PageMetaDto {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct MosaicDefinitionDto {
    pub id: MosaicIdDto,
    #[serde(default)]
    pub properties: Vec<PropertyDto>,
}

#[derive(Debug, Deserialize)]
pub struct PropertyDto {
    pub name: String,
    pub value: String,
}

impl MosaicDefinitionDto {
    pub fn divisibility(&self) -> Option<u8> {
        self.properties
            .iter()
            .find(|property| property.name == "divisibility")
            .and_then(|property| property.value.parse().ok())
    }
}

impl From<MosaicIdDto> for MosaicId {
    fn from(value: MosaicIdDto) -> Self {
        MosaicId::new(value.namespace_id, value.name)
    }
}

impl From<MosaicDto> for MosaicAmount {
    fn from(value: MosaicDto) -> Self {
        MosaicAmount::new(value.mosaic_id.into(), value.quantity)
    }
}

impl From<BlockDto> for Block {
    fn from(value: BlockDto) -> Self {
        Block {
            height: value.height,
            transactions: value.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<TransactionDto> for Transaction {
    fn from(value: TransactionDto) -> Self {
        match value.tx_type {
            TRANSFER_TYPE => value
                .into_transfer()
                .map(Transaction::Transfer)
                .unwrap_or(Transaction::Other),
            MULTISIG_TYPE => match value.other_trans {
                Some(inner) => Transaction::Multisig(Box::new((*inner).into())),
                None => Transaction::Other,
            },
            _ => Transaction::Other,
        }
    }
}

impl TransactionDto {
    fn into_transfer(self) -> Option<Transfer> {
        let message = self
            .message
            .and_then(|message| message.payload)
            .filter(|payload| !payload.is_empty());
        Some(Transfer {
            signer: self.signer?,
            recipient: self.recipient?,
            amount: self.amount.unwrap_or_default(),
            message,
            mosaics: self
                .mosaics
                .unwrap_or_default()
                .into_iter()
                .map(Into::into)
                .collect(),
        })
    }
}
