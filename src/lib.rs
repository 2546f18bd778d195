//! Transboxer - streaming WebM (H.264) to fragmented MP4 remuxing
//!
//! Input arrives as arbitrary chunks; output leaves as self-contained
//! pieces: one init segment, then one `moof` + `mdat` per video frame.
//!
//! ```
//! use transboxer::{config::TransboxConfig, Collector, Transboxer};
//!
//! let mut transboxer = Transboxer::new(TransboxConfig::default(), Collector::default());
//! transboxer.write_buffer(&[0x1A, 0x45, 0xDF, 0xA3, 0x80]).unwrap();
//! transboxer.end().unwrap();
//! assert_eq!(transboxer.sink().counts.unwrap().bytes, 5);
//! ```

pub mod config;
pub mod drive;
pub mod error;
pub mod transboxer;

pub use error::{Error, Result};
pub use transboxer::{Collector, Counts, PendingWrite, TransboxSink, Transboxer, WriteSink};
