//! Page image de-obfuscation.

use crate::error::{Error, Result};

/// Reverse the repeating-key XOR applied to encrypted page images.
///
/// `key_hex` is the hex string carried by the page descriptor. The output has
/// exactly the length of the input.
pub fn decrypt(data: &[u8], key_hex: &str) -> Result<Vec<u8>> {
    let key = hex::decode(key_hex.trim())
        .map_err(|e| Error::Decode(format!("Invalid encryption key: {}", e)))?;

    if key.is_empty() {
        return Err(Error::Decode("Empty encryption key".to_string()));
    }

    if data.is_empty() {
        return Err(Error::Decode("Encrypted image is empty".to_string()));
    }

    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect())
}
