//! Maps raw banner lookup records onto canonical channel entries.
//!
//! Source attribute keys arrive in whatever casing the upstream writer used
//! (`backgroundUrl`, `logo_url`, ...). They are resolved through a fixed,
//! versioned [`KeyTable`] rather than by rewriting key strings at runtime, so
//! the output field names are always the snake_case names declared here.
//!
//! Malformed attribute values never fail a build: the affected field is left
//! out of the entry.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::contract::{BannerRecord, WalletConnectedState};

/// Bump whenever a spelling is added to or removed from [`KEY_SPELLINGS`].
pub const KEY_TABLE_VERSION: u32 = 1;

/// Suggested contribution amounts shown when a channel configures none.
pub const DEFAULT_DONATION_AMOUNTS: [f64; 3] = [1.0, 5.0, 10.0];

/// Scalar banner fields carried into [`BannerDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarField {
    Title,
    Description,
    BackgroundUrl,
    LogoUrl,
    Web3Url,
}

impl ScalarField {
    /// Canonical snake_case name.
    pub const fn name(self) -> &'static str {
        match self {
            ScalarField::Title => "title",
            ScalarField::Description => "description",
            ScalarField::BackgroundUrl => "background_url",
            ScalarField::LogoUrl => "logo_url",
            ScalarField::Web3Url => "web3_url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BannerKey {
    Scalar(ScalarField),
    DonationAmounts,
    SocialLinks,
}

/// Every external key spelling we accept, and the field it lands in.
const KEY_SPELLINGS: &[(&str, BannerKey)] = &[
    ("title", BannerKey::Scalar(ScalarField::Title)),
    ("Title", BannerKey::Scalar(ScalarField::Title)),
    ("description", BannerKey::Scalar(ScalarField::Description)),
    ("Description", BannerKey::Scalar(ScalarField::Description)),
    ("backgroundUrl", BannerKey::Scalar(ScalarField::BackgroundUrl)),
    ("BackgroundUrl", BannerKey::Scalar(ScalarField::BackgroundUrl)),
    ("backgroundURL", BannerKey::Scalar(ScalarField::BackgroundUrl)),
    ("background_url", BannerKey::Scalar(ScalarField::BackgroundUrl)),
    ("logoUrl", BannerKey::Scalar(ScalarField::LogoUrl)),
    ("LogoUrl", BannerKey::Scalar(ScalarField::LogoUrl)),
    ("logoURL", BannerKey::Scalar(ScalarField::LogoUrl)),
    ("logo_url", BannerKey::Scalar(ScalarField::LogoUrl)),
    ("web3Url", BannerKey::Scalar(ScalarField::Web3Url)),
    ("Web3Url", BannerKey::Scalar(ScalarField::Web3Url)),
    ("web3URL", BannerKey::Scalar(ScalarField::Web3Url)),
    ("web3_url", BannerKey::Scalar(ScalarField::Web3Url)),
    ("donationAmounts", BannerKey::DonationAmounts),
    ("DonationAmounts", BannerKey::DonationAmounts),
    ("donation_amounts", BannerKey::DonationAmounts),
    ("socialLinks", BannerKey::SocialLinks),
    ("SocialLinks", BannerKey::SocialLinks),
    ("social_links", BannerKey::SocialLinks),
];

/// Lookup table from external key spelling to canonical field, built once.
#[derive(Debug, Clone)]
pub struct KeyTable {
    by_spelling: HashMap<&'static str, BannerKey>,
}

impl KeyTable {
    pub fn new() -> Self {
        Self {
            by_spelling: KEY_SPELLINGS.iter().copied().collect(),
        }
    }

    pub fn version(&self) -> u32 {
        KEY_TABLE_VERSION
    }

    /// Canonical name for an external key, if the key is known.
    pub fn canonical_name(&self, key: &str) -> Option<&'static str> {
        self.lookup(key).map(|k| match k {
            BannerKey::Scalar(field) => field.name(),
            BannerKey::DonationAmounts => "donation_amounts",
            BannerKey::SocialLinks => "social_links",
        })
    }

    fn lookup(&self, key: &str) -> Option<BannerKey> {
        self.by_spelling.get(key).copied()
    }
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Display/configuration metadata for one channel's banner.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BannerDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web3_url: Option<String>,
    /// Default amounts followed by the channel's own; absent when the channel kept the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_amounts: Option<Vec<f64>>,
    /// Domain to handle. Never present as an empty map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_links: Option<BTreeMap<String, String>>,
}

impl BannerDetails {
    fn set_scalar(&mut self, field: ScalarField, text: String) {
        let slot = match field {
            ScalarField::Title => &mut self.title,
            ScalarField::Description => &mut self.description,
            ScalarField::BackgroundUrl => &mut self.background_url,
            ScalarField::LogoUrl => &mut self.logo_url,
            ScalarField::Web3Url => &mut self.web3_url,
        };
        *slot = Some(text);
    }
}

/// Canonical per-channel entry in a bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelEntry {
    pub channel_identifier: String,
    pub wallet_connected_state: WalletConnectedState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_banner_details: Option<BannerDetails>,
}

/// Every entry for one prefix, in record source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResponseBundle {
    pub entries: Vec<ChannelEntry>,
}

impl ResponseBundle {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds [`ResponseBundle`]s from raw records.
#[derive(Debug, Clone, Default)]
pub struct EntryBuilder {
    keys: KeyTable,
}

impl EntryBuilder {
    pub fn new() -> Self {
        Self {
            keys: KeyTable::new(),
        }
    }

    pub fn key_table(&self) -> &KeyTable {
        &self.keys
    }

    pub fn build(&self, records: &[BannerRecord]) -> ResponseBundle {
        ResponseBundle {
            entries: records.iter().map(|r| self.build_entry(r)).collect(),
        }
    }

    pub fn build_entry(&self, record: &BannerRecord) -> ChannelEntry {
        ChannelEntry {
            channel_identifier: record.channel_identifier.clone(),
            wallet_connected_state: record.wallet_status,
            wallet_address: record
                .wallet_address
                .as_ref()
                .filter(|a| !is_blank(a))
                .cloned(),
            site_banner_details: Some(self.banner_details(&record.derived_site_banner_info)),
        }
    }

    fn banner_details(&self, info: &Map<String, Value>) -> BannerDetails {
        let mut details = BannerDetails::default();
        for (key, value) in info {
            let Some(field) = self.keys.lookup(key) else {
                debug!(key = %key, "Skipping unknown banner attribute");
                continue;
            };
            match field {
                BannerKey::Scalar(scalar) => {
                    if let Some(text) = scalar_text(value) {
                        details.set_scalar(scalar, text);
                    }
                }
                BannerKey::DonationAmounts => details.donation_amounts = donation_amounts(value),
                BannerKey::SocialLinks => details.social_links = social_links(value),
            }
        }
        details
    }
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// Custom amounts are appended to the defaults, not substituted for them.
// Clients rely on this layout.
fn donation_amounts(value: &Value) -> Option<Vec<f64>> {
    let Value::Array(items) = value else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    let amounts = items.iter().map(Value::as_f64).collect::<Option<Vec<f64>>>()?;
    if amounts == DEFAULT_DONATION_AMOUNTS {
        return None;
    }
    Some(
        DEFAULT_DONATION_AMOUNTS
            .iter()
            .copied()
            .chain(amounts)
            .collect(),
    )
}

fn social_links(value: &Value) -> Option<BTreeMap<String, String>> {
    let Value::Object(links) = value else {
        return None;
    };
    let kept: BTreeMap<String, String> = links
        .iter()
        .filter_map(|(domain, handle)| match handle {
            Value::String(h) if !is_blank(h) => Some((domain.clone(), h.clone())),
            _ => None,
        })
        .collect();
    (!kept.is_empty()).then_some(kept)
}
