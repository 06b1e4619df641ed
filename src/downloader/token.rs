// Download token generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::TryRngCore;

use super::errors::DownloadError;

/// Bytes of entropy per token. Encodes to 32 URL-safe characters.
pub const TOKEN_BYTES: usize = 24;

/// Mint an opaque, path-safe download token from the OS entropy source.
///
/// Uniqueness is probabilistic; callers do not check for reuse beyond the
/// store refusing to overwrite a live entry.
pub fn generate_token() -> Result<String, DownloadError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| DownloadError::TokenGeneration(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_is_url_safe_and_unpadded() {
        let token = generate_token().unwrap();
        assert_eq!(token.len(), 32);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_token_decodes_to_full_entropy() {
        let token = generate_token().unwrap();
        let raw = URL_SAFE_NO_PAD.decode(token).unwrap();
        assert_eq!(raw.len(), TOKEN_BYTES);
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token().unwrap()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
