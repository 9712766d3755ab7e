//! Ledger data structures shared across the monitor and bot crates.

mod address;

use std::{borrow::Borrow, fmt};

use serde::Serialize;
use thiserror::Error;

pub use address::derive_address;

/// Canonical name of the ledger's native asset.
pub const NATIVE_MOSAIC: &str = "nem:xem";

/// Decimal places of the native asset.
pub const NATIVE_DIVISIBILITY: u8 = 6;

/// The two independent ledgers the watcher follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkTag {
    Production,
    Test,
}

impl NetworkTag {
    pub const ALL: [NetworkTag; 2] = [NetworkTag::Production, NetworkTag::Test];

    /// Version byte prepended to the account hash when deriving addresses.
    pub fn version_byte(self) -> u8 {
        match self {
            NetworkTag::Production => 0x68,
            NetworkTag::Test => 0x98,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkTag::Production => "production",
            NetworkTag::Test => "test",
        }
    }
}

impl fmt::Display for NetworkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors emitted when user-supplied addresses or signer keys are unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("invalid public key `{0}`")]
    InvalidPublicKey(String),
}

/// Classifies an address by its leading character: `T` is the test network,
/// `N` production, anything else is rejected.
pub fn classify(address: &str) -> Result<NetworkTag, AddressError> {
    match address.chars().next() {
        Some('T') => Ok(NetworkTag::Test),
        Some('N') => Ok(NetworkTag::Production),
        _ => Err(AddressError::InvalidAddress(address.to_string())),
    }
}

/// Ledger address, normalized to the undashed upper-case form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Normalizes user input (drops `-` separators and whitespace) and
    /// validates the network marker.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let normalized: String = raw
            .chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        classify(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn network(&self) -> NetworkTag {
        // Constructors only admit `T` or `N` prefixes.
        if self.0.starts_with('T') {
            NetworkTag::Test
        } else {
            NetworkTag::Production
        }
    }

    pub(crate) fn from_encoded(encoded: String) -> Self {
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mosaic identifier; its canonical key is `namespace:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MosaicId {
    pub namespace: String,
    pub name: String,
}

impl MosaicId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn canonical(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }
}

/// Raw mosaic quantity as carried by a transfer or an account balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicAmount {
    pub mosaic: MosaicId,
    pub quantity: u64,
}

impl MosaicAmount {
    pub fn new(mosaic: MosaicId, quantity: u64) -> Self {
        Self { mosaic, quantity }
    }
}

/// A quantity paired with the divisibility needed to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MosaicWithDivisibility {
    pub full_name: String,
    pub quantity: u64,
    pub divisibility: u8,
}

impl MosaicWithDivisibility {
    pub fn new(full_name: impl Into<String>, quantity: u64, divisibility: u8) -> Self {
        Self {
            full_name: full_name.into(),
            quantity,
            divisibility,
        }
    }

    pub fn native(quantity: u64) -> Self {
        Self::new(NATIVE_MOSAIC, quantity, NATIVE_DIVISIBILITY)
    }

    pub fn rendered_amount(&self) -> String {
        format_amount(self.quantity, self.divisibility)
    }
}

/// Places the decimal point `divisibility` digits from the right, padding
/// with leading zeros so at least one integer digit remains.
pub fn format_amount(quantity: u64, divisibility: u8) -> String {
    let digits = quantity.to_string();
    if divisibility == 0 {
        return digits;
    }
    let scale = usize::from(divisibility);
    let padded = format!("{digits:0>width$}", width = scale + 1);
    let (integer, decimal) = padded.split_at(padded.len() - scale);
    format!("{integer}.{decimal}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub height: u64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Transfer(Transfer),
    Multisig(Box<Transaction>),
    Other,
}

impl Transaction {
    /// Returns the transfer carried directly or by a single multisig
    /// wrapper. Deeper nesting is not unwrapped.
    pub fn as_transfer(&self) -> Option<&Transfer> {
        match self {
            Transaction::Transfer(transfer) => Some(transfer),
            Transaction::Multisig(inner) => match inner.as_ref() {
                Transaction::Transfer(transfer) => Some(transfer),
                _ => None,
            },
            Transaction::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Hex-encoded signer public key.
    pub signer: String,
    pub recipient: String,
    /// Native asset amount in micro units.
    pub amount: u64,
    /// Hex-encoded message payload, if any.
    pub message: Option<String>,
    pub mosaics: Vec<MosaicAmount>,
}

impl Transfer {
    pub fn is_native_only(&self) -> bool {
        self.mosaics.is_empty()
    }
}

/// Event published for each subscription a transfer touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferNotice {
    pub conversation_id: String,
    pub label: String,
    pub message: String,
    pub mosaics: Vec<MosaicWithDivisibility>,
    pub is_recipient: bool,
}
