use serde::{Deserialize, Serialize};

use transboxer_ebml::DEFAULT_MAX_LEAF_SIZE;
use transboxer_fmp4::{DEFAULT_HANDLER_NAME, DEFAULT_INITIAL_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub transbox: TransboxConfig,

    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TransboxConfig {
    /// Media type attached to every output chunk
    #[serde(default = "default_media_type")]
    pub media_type: String,

    /// Initial output buffer reservation in bytes
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,

    /// Track and movie timescale (ticks per second)
    #[serde(default = "default_timescale")]
    pub timescale: u32,

    #[serde(default = "default_track_id")]
    pub track_id: u32,

    /// Name written into the `hdlr` box
    #[serde(default = "default_handler_name")]
    pub handler_name: String,

    /// Fail on undetectable NALU framing, missing parameter sets and
    /// unsupported avcC versions instead of guessing
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Largest EBML leaf element (e.g. a SimpleBlock) buffered, in bytes
    #[serde(default = "default_max_leaf_size")]
    pub max_leaf_size: u64,
}

fn default_media_type() -> String {
    "video/mp4; codecs=\"avc1.42C01E\"".to_string()
}
fn default_initial_size() -> usize {
    DEFAULT_INITIAL_SIZE
}
fn default_timescale() -> u32 {
    1000
}
fn default_track_id() -> u32 {
    1
}
fn default_handler_name() -> String {
    DEFAULT_HANDLER_NAME.to_string()
}
fn default_strict() -> bool {
    true
}
fn default_max_leaf_size() -> u64 {
    DEFAULT_MAX_LEAF_SIZE
}

impl Default for TransboxConfig {
    fn default() -> Self {
        Self {
            media_type: default_media_type(),
            initial_size: default_initial_size(),
            timescale: default_timescale(),
            track_id: default_track_id(),
            handler_name: default_handler_name(),
            strict: default_strict(),
            max_leaf_size: default_max_leaf_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct InputConfig {
    /// Read size used by the file and stdin drivers
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}
