//! Content hashing.
//!
//! MD5 over byte buffers. We don't need cryptographic strength here, only a
//! cheap, stable fingerprint to decide whether a source or artifact buffer
//! changed between runs; MD5 is what `buildinfo.rs` uses for the same
//! purpose.

use md5::Digest;

/// A 16-byte content digest.
pub type Digest16 = [u8; 16];

/// Hashes a byte buffer with MD5.
pub fn hash_bytes(data: &[u8]) -> Digest16 {
    let mut hasher = md5::Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hashes the contents of a file on disk.
pub fn hash_file(path: &std::path::Path) -> std::io::Result<Digest16> {
    let data = std::fs::read(path)?;
    Ok(hash_bytes(&data))
}
