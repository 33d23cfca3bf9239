//! # waxwing-mcl
//!
//! The MCL container format and its file store: a single opaque blob per
//! file, transparently gzip-compressed and/or sealed with a password-derived
//! key, identified by a 3-byte signature. On top of it, a versioned
//! serializer persists whole models and recovers to an empty model when a
//! file is missing or unreadable.
//!
//! ## Modules
//!
//! - [`codec`] — signature dispatch, gzip, and the sealed (encrypted) layout.
//! - [`store`] — path-keyed registry of open files with staleness detection.
//! - [`serializer`] — versioned whole-model save/load with write debounce.
//!
//! ## Legacy fixed-nonce layout
//!
//! Files written by older builds carry no per-file nonce: every file sealed
//! with the same password reuses one hardcoded nonce, so identical plaintext
//! prefixes produce identical ciphertext prefixes across files. That layout
//! is kept behind [`codec::NonceLayout::LegacyFixed`] strictly to read and
//! rewrite old files; the default layout stores a fresh random nonce in
//! every file. Do not select the legacy layout for new data.

pub mod codec;
pub mod serializer;
pub mod store;

/// Error types for container encoding and persistence.
#[derive(Debug, thiserror::Error)]
pub enum MclError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed; wrong password or corrupted file.
    #[error("cipher error: unable to open sealed payload")]
    Cipher,

    #[error("sealed payload truncated: {len} bytes after signature")]
    Truncated { len: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience result type for container operations.
pub type Result<T> = std::result::Result<T, MclError>;
