use std::{collections::HashMap, fmt};

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Deserializer};

use crate::error::{RangedlError, RangedlResult};

/// Segments are served below this path, next to the playlist itself.
const RANGE_ANCHOR: &str = "/v2/";
const RANGE_PATH: &str = "/v2/range/prot/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    /// Name of the variant attribute used to rank variants of this kind.
    pub fn quality_key(&self) -> &'static str {
        match self {
            Self::Video => "height",
            Self::Audio => "bitrate",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub video: Vec<Variant>,
    #[serde(default)]
    pub audio: Vec<Variant>,
}

impl Manifest {
    pub fn variants(&self, kind: TrackKind) -> &[Variant] {
        match kind {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Variant {
    pub id: String,

    /// Decoded initialization segment, which must precede every media segment.
    #[serde(deserialize_with = "deserialize_base64")]
    pub init_segment: Vec<u8>,

    /// Media segments in playback order.
    #[serde(default)]
    pub segments: Vec<SegmentRef>,

    /// Remaining fields of the variant, such as `height`, `bitrate` or `codecs`.
    #[serde(flatten)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Variant {
    /// Numeric attribute of the variant, `0` when absent or not a number.
    pub fn quality(&self, key: &str) -> f64 {
        self.attributes
            .get(key)
            .and_then(serde_json::Value::as_f64)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SegmentRef {
    /// Segment location relative to the range base url.
    pub url: String,
}

fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded.trim())
        .map_err(serde::de::Error::custom)
}

/// Base url that relative segment urls are appended to.
///
/// Everything after the first `/v2/` of the playlist url is replaced by the
/// range endpoint. A url without the anchor keeps its full text as prefix.
pub fn segment_base_url(playlist_url: &str) -> String {
    let head = match playlist_url.split_once(RANGE_ANCHOR) {
        Some((head, _)) => head,
        None => {
            tracing::warn!("Playlist url has no {RANGE_ANCHOR} segment, using it as base url.");
            playlist_url
        }
    };
    format!("{head}{RANGE_PATH}")
}

pub async fn fetch_manifest(client: &Client, url: &str) -> RangedlResult<Manifest> {
    tracing::info!("Fetching playlist...");

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(RangedlError::HttpError(response.status()));
    }

    let body = response.bytes().await?;
    let manifest: Manifest = serde_json::from_slice(&body)?;
    tracing::info!(
        "Playlist fetched: {} video and {} audio variant(s).",
        manifest.video.len(),
        manifest.audio.len()
    );
    Ok(manifest)
}
