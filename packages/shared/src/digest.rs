//! Password digest computed by the client before anything leaves the machine.
//!
//! The server only ever stores and compares digests; it never sees plaintext.

use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 bytes, rendered as lowercase hex.
pub fn password_digest(plain: &str) -> String {
    format!("{:x}", Sha256::digest(plain.as_bytes()))
}
