//! Fragmented MP4 output for a single AVC video track.
//!
//! - [`atom`]: the shared-buffer atom tree with back-patched sizes
//! - [`boxes`]: field layouts for each box type
//! - [`writer`]: init segment (`ftyp` + `moov`) and `moof` + `mdat` fragments
//!
//! ```
//! use transboxer_fmp4::{writer, AtomTree, OutputChunk};
//!
//! let mut tree: AtomTree<Vec<OutputChunk>> = AtomTree::new("video/mp4", 256, Vec::new());
//! let root = tree.root();
//! writer::write_ftyp(&mut tree, root).unwrap();
//! tree.flush().unwrap();
//! assert_eq!(tree.sink()[0].data.len(), 28);
//! ```

pub mod atom;
pub mod boxes;
pub mod error;
pub mod writer;

pub use atom::{AtomId, AtomTree, AtomWriter, ChunkSink, FourCc, OutputChunk, DEFAULT_INITIAL_SIZE};
pub use boxes::{BoxSpec, DEFAULT_HANDLER_NAME};
pub use error::{Error, Result};
pub use writer::{Sample, VideoTrack};
