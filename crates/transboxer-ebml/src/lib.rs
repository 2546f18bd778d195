//! Incremental EBML decoding for live WebM / Matroska streams.
//!
//! [`Decoder`] accepts input in arbitrarily sized chunks and reports a flat
//! sequence of [`TagEvent`]s (`Start`, `Tag`, `End`) through a callback,
//! pausing transparently whenever an element straddles a chunk boundary.
//!
//! # Example
//!
//! ```
//! use transboxer_ebml::{encode, schema::ids, Decoder, Error, TagKind};
//!
//! let cluster = encode::master(ids::CLUSTER, [encode::unsigned(ids::TIMECODE, 40)?])?;
//!
//! let mut decoder = Decoder::new();
//! let mut names = Vec::new();
//! for byte in cluster.chunks(1) {
//!     decoder.write(byte, |ev| {
//!         names.push((ev.kind, ev.name));
//!         Ok::<_, Error>(())
//!     })?;
//! }
//! assert_eq!(names[1], (TagKind::Tag, "Timecode"));
//! # Ok::<(), Error>(())
//! ```

pub mod block;
pub mod decoder;
pub mod encode;
pub mod error;
pub mod schema;
pub mod value;
pub mod vint;

pub use block::{Block, Lacing};
pub use decoder::{Decoder, TagEvent, TagKind, DEFAULT_MAX_LEAF_SIZE};
pub use error::{Error, Result};
pub use schema::{ElementSchema, ElementType};
pub use value::Value;
