//! Request correlation ids and small key helpers

use bech32::Bech32m;
use uuid7::uuid7;

/// Human readable prefix for request correlation ids.
pub const REQUEST_HRP: &str = "req";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Correlation id attached to the tracing span of every service call.
/// Falls back to the raw uuid when bech32 encoding is unavailable.
pub fn new_request_id() -> String {
    new_uuid_to_bech32(REQUEST_HRP).unwrap_or_else(|_| uuid7().to_string())
}

pub(crate) fn id_key(id: u64) -> Vec<u8> {
    id.to_be_bytes().to_vec()
}

pub(crate) fn key_id(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
