//! Blob encodings: signature dispatch, gzip, and the sealed layout.
//!
//! The first 3 bytes of a file select the decoder:
//!
//! | signature | layout                              |
//! |-----------|-------------------------------------|
//! | `mcl`     | gzip(payload)                       |
//! | `mpw`     | seal(payload)                       |
//! | `mcp`     | seal(gzip(payload))                 |
//! | other     | the whole file, signature included, is plaintext payload |
//!
//! Sealing is ChaCha20-Poly1305 under `SHA-256(utf8(password))`; with no
//! password the key is 32 zero bytes. The default layout stores a random
//! 12-byte nonce between the signature and the ciphertext. The legacy
//! layout stores nothing and reuses one fixed nonce for every file — a
//! known weakness kept only to read files from older builds.

use std::io::{Read, Write};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{MclError, Result};

/// Signature for gzip-compressed payloads.
pub const SIG_GZIP: [u8; 3] = *b"mcl";
/// Signature for sealed payloads.
pub const SIG_SEALED: [u8; 3] = *b"mpw";
/// Signature for sealed gzip-compressed payloads.
pub const SIG_GZIP_SEALED: [u8; 3] = *b"mcp";

/// Nonce size of the sealed layout (ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// The single nonce the legacy layout reused for every file.
const LEGACY_NONCE: [u8; NONCE_SIZE] = *b"waxwing-mcl\0";

/// The transformation applied between the in-memory payload and the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlobCodec {
    #[default]
    Plain,
    Gzip,
    Sealed,
    GzipSealed,
}

impl BlobCodec {
    /// Build a codec from the two independent encoding flags.
    pub fn from_flags(compress: bool, encrypt: bool) -> Self {
        match (compress, encrypt) {
            (false, false) => BlobCodec::Plain,
            (true, false) => BlobCodec::Gzip,
            (false, true) => BlobCodec::Sealed,
            (true, true) => BlobCodec::GzipSealed,
        }
    }

    /// The on-disk signature, if the codec writes one.
    pub fn signature(&self) -> Option<[u8; 3]> {
        match self {
            BlobCodec::Plain => None,
            BlobCodec::Gzip => Some(SIG_GZIP),
            BlobCodec::Sealed => Some(SIG_SEALED),
            BlobCodec::GzipSealed => Some(SIG_GZIP_SEALED),
        }
    }
}

/// Where the sealed layout finds its nonce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NonceLayout {
    /// A fresh random nonce is written after the signature.
    #[default]
    Random,
    /// No stored nonce; one hardcoded nonce shared by every file. Legacy
    /// weakness, read-compatibility only.
    LegacyFixed,
}

/// A sealing key derived from a password. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey([u8; 32]);

impl StoreKey {
    /// `SHA-256(utf8(password))`, or 32 zero bytes with no password.
    pub fn derive(password: Option<&str>) -> Self {
        match password {
            Some(pw) => {
                let digest = Sha256::digest(pw.as_bytes());
                let mut key = [0u8; 32];
                key.copy_from_slice(&digest);
                Self(key)
            }
            None => Self([0u8; 32]),
        }
    }
}

/// Encode a payload for disk under the given codec.
pub fn encode(
    payload: &[u8],
    codec: BlobCodec,
    key: &StoreKey,
    layout: NonceLayout,
) -> Result<Vec<u8>> {
    match codec {
        BlobCodec::Plain => Ok(payload.to_vec()),
        BlobCodec::Gzip => {
            let mut out = SIG_GZIP.to_vec();
            out.extend_from_slice(&gzip(payload)?);
            Ok(out)
        }
        BlobCodec::Sealed => {
            let mut out = SIG_SEALED.to_vec();
            out.extend_from_slice(&seal(payload, key, layout)?);
            Ok(out)
        }
        BlobCodec::GzipSealed => {
            let mut out = SIG_GZIP_SEALED.to_vec();
            out.extend_from_slice(&seal(&gzip(payload)?, key, layout)?);
            Ok(out)
        }
    }
}

/// Decode a file image by inspecting its signature.
///
/// An unrecognized signature means the file was written plain; the whole
/// image, including the 3 bytes just inspected, is the payload.
pub fn decode(image: &[u8], key: &StoreKey, layout: NonceLayout) -> Result<Vec<u8>> {
    let Some(rest) = image.get(3..) else {
        return Ok(image.to_vec());
    };
    let sig = [image[0], image[1], image[2]];
    match sig {
        SIG_GZIP => gunzip(rest),
        SIG_SEALED => unseal(rest, key, layout),
        SIG_GZIP_SEALED => gunzip(&unseal(rest, key, layout)?),
        _ => Ok(image.to_vec()),
    }
}

fn gzip(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    Ok(encoder.finish()?)
}

fn gunzip(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn seal(payload: &[u8], key: &StoreKey, layout: NonceLayout) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    match layout {
        NonceLayout::Random => {
            let mut nonce = [0u8; NONCE_SIZE];
            rand::rngs::OsRng.fill_bytes(&mut nonce);
            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce), payload)
                .map_err(|_| MclError::Cipher)?;
            let mut out = nonce.to_vec();
            out.extend_from_slice(&ciphertext);
            Ok(out)
        }
        NonceLayout::LegacyFixed => cipher
            .encrypt(Nonce::from_slice(&LEGACY_NONCE), payload)
            .map_err(|_| MclError::Cipher),
    }
}

fn unseal(sealed: &[u8], key: &StoreKey, layout: NonceLayout) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.0));
    let (nonce, ciphertext) = match layout {
        NonceLayout::Random => {
            if sealed.len() < NONCE_SIZE {
                return Err(MclError::Truncated { len: sealed.len() });
            }
            let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
            (Nonce::from_slice(nonce).to_owned(), ciphertext)
        }
        NonceLayout::LegacyFixed => (Nonce::from_slice(&LEGACY_NONCE).to_owned(), sealed),
    };
    cipher
        .decrypt(&nonce, ciphertext)
        .map_err(|_| MclError::Cipher)
}
