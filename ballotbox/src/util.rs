use crate::*;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Standard (padded) base64, the encoding used for every binary field on the wire
pub fn encode_b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 wire field, naming the field on failure
pub fn decode_b64(field: &'static str, value: &str) -> Result<Vec<u8>, DecryptionError> {
    STANDARD
        .decode(value.trim())
        .map_err(|source| DecryptionError::Base64 { field, source })
}

/// Wallet addresses are compared and stored lowercase
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Treat blank strings the same as absent ones
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
