//! Git blob hashing.

use sha1::{Digest, Sha1};

/// Git blob id of `content`: SHA-1 over `blob <len>\0<content>`.
///
/// Equal to the `sha` GitHub reports for a file with this content, so it
/// can short-circuit writes that would not change anything.
#[must_use]
pub fn git_blob_sha(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}
