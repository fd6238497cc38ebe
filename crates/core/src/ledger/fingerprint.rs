//! Content fingerprints for change detection.
//!
//! CRC-32 (IEEE) over the UTF-8 bytes of the extracted text. Equal text always
//! yields an equal fingerprint; a 32-bit checksum can still collide, so a
//! change that happens to keep the checksum goes unnoticed.

/// Compute the fingerprint of extracted article text.
pub fn fingerprint(text: &str) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize()
}
