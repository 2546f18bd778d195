//! Error type for the remux pipeline.

use std::io;
use thiserror::Error;

/// Result type for transboxer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("EBML: {0}")]
    Ebml(#[from] transboxer_ebml::Error),

    #[error("H.264: {0}")]
    Avc(#[from] transboxer_avc::Error),

    #[error("MP4: {0}")]
    Fmp4(#[from] transboxer_fmp4::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `end` was already requested for this stream.
    #[error("finish was already requested")]
    FinishRequested,

    /// The stream has finished; no more input is accepted.
    #[error("stream already finished")]
    Finished,

    /// An earlier error aborted the stream.
    #[error("stream aborted by an earlier error")]
    Aborted,

    #[error("write ticket {0} is not outstanding")]
    UnknownTicket(u64),

    /// Neither the stream nor the track header gave usable dimensions.
    #[error("no picture geometry: SPS unavailable ({reason}) and no PixelWidth/PixelHeight")]
    MissingGeometry { reason: String },
}
