use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// Upload payload cap. The hosted deployment enforced 4 MB under its
/// serverless body limit; local workspaces keep the same contract.
pub const MAX_FILE_BYTES: usize = 4 * 1024 * 1024;

pub fn encode_base64(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decodes an uploaded `content` field. Plain base64 is the wire format;
/// `\x`-prefixed hex is also accepted because that is how the hosted
/// Postgres driver rendered BYTEA columns over HTTP, and dumps of the old
/// database arrive in that shape.
pub fn decode_content(content: &str) -> anyhow::Result<Vec<u8>> {
    if let Some(hex_part) = content.strip_prefix("\\x") {
        return hex::decode(hex_part).context("invalid hex content");
    }
    general_purpose::STANDARD
        .decode(content.trim())
        .context("invalid base64 content")
}

pub fn check_size(bytes: &[u8]) -> anyhow::Result<()> {
    if bytes.len() > MAX_FILE_BYTES {
        return Err(anyhow!(
            "file too large: {} bytes (max {})",
            bytes.len(),
            MAX_FILE_BYTES
        ));
    }
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
