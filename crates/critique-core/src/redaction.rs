//! Log-safe fingerprints for private text (essays, prompts, model output).
//!
//! Essay text crosses the process boundary only inside the LLM request body.
//! Logs and spans carry a truncated SHA-256 digest instead, which is enough to
//! correlate repeated submissions without revealing content. Model output is
//! treated the same way, since it quotes the essay verbatim.

use sha2::{Digest, Sha256};

const DIGEST_HEX_CHARS: usize = 16;

/// `sha256:<first 16 hex chars>` of the input.
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let full = hex::encode(hasher.finalize());
    format!("sha256:{}", &full[..DIGEST_HEX_CHARS])
}
