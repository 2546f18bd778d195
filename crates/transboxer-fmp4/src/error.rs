//! Error types for transboxer-fmp4.

use std::io;
use thiserror::Error;

use crate::atom::AtomId;

/// Result type for transboxer-fmp4 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for atom tree misuse and output delivery.
#[derive(Debug, Error)]
pub enum Error {
    /// The output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `end` was called on an atom that is no longer open.
    #[error("cannot end() an atom more than once ({0})")]
    AlreadyEnded(AtomId),

    /// Write, open or peek on an atom that has already ended.
    #[error("Atom {0} is no longer open")]
    NotOpen(AtomId),

    /// The id was never handed out by this tree.
    #[error("Unknown atom {0}")]
    UnknownAtom(AtomId),

    /// A parent may hold at most one open child.
    #[error("Atom {parent} already has an open child {child}")]
    ChildAlreadyOpen { parent: AtomId, child: AtomId },

    /// Writing to or ending an atom whose child is still open.
    #[error("Atom {atom} has an open child {child}")]
    ChildStillOpen { atom: AtomId, child: AtomId },

    /// A counted container was ended without reserving its count.
    #[error("no item count placeholder in '{0}'")]
    MissingCountPlaceholder(String),

    /// Count placeholders only apply to counted containers, once.
    #[error("Atom '{0}' cannot take a count placeholder")]
    UnexpectedCountPlaceholder(String),

    /// Box sizes are 32-bit.
    #[error("Atom '{fourcc}' is {len} bytes, larger than a 32-bit size")]
    AtomTooLarge { fourcc: String, len: usize },
}
