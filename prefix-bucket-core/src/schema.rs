//! Protocol buffer messages for the published bucket payload.
//!
//! These definitions are the compatibility contract with clients: tag numbers
//! and field types must not change without bumping [`SCHEMA_VERSION`].
//!
//! ```text
//! message ChannelResponseList { repeated ChannelResponse channel_responses = 1; }
//! message ChannelResponse {
//!   string channel_identifier = 1;
//!   WalletConnectedState wallet_connected_state = 2;
//!   optional string wallet_address = 3;
//!   optional SiteBannerDetails site_banner_details = 4;
//! }
//! message SiteBannerDetails {
//!   optional string title = 1;
//!   optional string description = 2;
//!   optional string background_url = 3;
//!   optional string logo_url = 4;
//!   repeated double donation_amounts = 5;
//!   optional SocialLinks social_links = 6;
//!   optional string web3_url = 7;
//! }
//! message SocialLinks { map<string, string> links = 1; }
//! ```
//!
//! Maps use `BTreeMap` so the encoding is deterministic.

use std::collections::BTreeMap;

use prost::Message;

use crate::contract::WalletConnectedState;
use crate::entry::{BannerDetails, ChannelEntry, ResponseBundle};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Message)]
pub struct ChannelResponseList {
    #[prost(message, repeated, tag = "1")]
    pub channel_responses: Vec<ChannelResponse>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ChannelResponse {
    #[prost(string, tag = "1")]
    pub channel_identifier: String,
    #[prost(enumeration = "WalletConnectedState", tag = "2")]
    pub wallet_connected_state: i32,
    #[prost(string, optional, tag = "3")]
    pub wallet_address: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub site_banner_details: Option<SiteBannerDetails>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SiteBannerDetails {
    #[prost(string, optional, tag = "1")]
    pub title: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub description: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub background_url: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub logo_url: Option<String>,
    #[prost(double, repeated, tag = "5")]
    pub donation_amounts: Vec<f64>,
    #[prost(message, optional, tag = "6")]
    pub social_links: Option<SocialLinks>,
    #[prost(string, optional, tag = "7")]
    pub web3_url: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct SocialLinks {
    #[prost(btree_map = "string, string", tag = "1")]
    pub links: BTreeMap<String, String>,
}

impl From<&ResponseBundle> for ChannelResponseList {
    fn from(bundle: &ResponseBundle) -> Self {
        Self {
            channel_responses: bundle.entries.iter().map(ChannelResponse::from).collect(),
        }
    }
}

impl From<&ChannelEntry> for ChannelResponse {
    fn from(entry: &ChannelEntry) -> Self {
        Self {
            channel_identifier: entry.channel_identifier.clone(),
            wallet_connected_state: entry.wallet_connected_state.into(),
            wallet_address: entry.wallet_address.clone(),
            site_banner_details: entry.site_banner_details.as_ref().map(SiteBannerDetails::from),
        }
    }
}

impl From<&BannerDetails> for SiteBannerDetails {
    fn from(details: &BannerDetails) -> Self {
        Self {
            title: details.title.clone(),
            description: details.description.clone(),
            background_url: details.background_url.clone(),
            logo_url: details.logo_url.clone(),
            donation_amounts: details.donation_amounts.clone().unwrap_or_default(),
            social_links: details
                .social_links
                .clone()
                .map(|links| SocialLinks { links }),
            web3_url: details.web3_url.clone(),
        }
    }
}

impl From<SiteBannerDetails> for BannerDetails {
    fn from(msg: SiteBannerDetails) -> Self {
        Self {
            title: msg.title,
            description: msg.description,
            background_url: msg.background_url,
            logo_url: msg.logo_url,
            web3_url: msg.web3_url,
            donation_amounts: (!msg.donation_amounts.is_empty()).then_some(msg.donation_amounts),
            social_links: msg
                .social_links
                .map(|s| s.links)
                .filter(|links| !links.is_empty()),
        }
    }
}

impl TryFrom<ChannelResponse> for ChannelEntry {
    type Error = prost::UnknownEnumValue;

    fn try_from(msg: ChannelResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            channel_identifier: msg.channel_identifier,
            wallet_connected_state: WalletConnectedState::try_from(msg.wallet_connected_state)?,
            wallet_address: msg.wallet_address,
            site_banner_details: msg.site_banner_details.map(BannerDetails::from),
        })
    }
}

impl TryFrom<ChannelResponseList> for ResponseBundle {
    type Error = prost::UnknownEnumValue;

    fn try_from(msg: ChannelResponseList) -> Result<Self, Self::Error> {
        Ok(Self {
            entries: msg
                .channel_responses
                .into_iter()
                .map(ChannelEntry::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}
