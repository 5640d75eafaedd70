// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

/// Generate a random alphanumeric string, used to derive a client identifier
/// when the caller leaves `client_id` empty.
pub fn random_string(len: usize) -> String {
    thread_rng().sample_iter(&Alphanumeric).take(len).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientIdError {
    /// no chars
    IsEmpty,

    /// Larger than 23 chars
    TooLong,

    /// Can only contain 0-9a-zA-Z
    InvalidChars,
}

/// Validate a client identifier against MQTT-3.1.3-5 (1..23 bytes,
/// `0-9a-zA-Z` only). A broker may permit other characters and longer ids,
/// but the library enforces the baseline guaranteed-interoperable range.
pub fn check_client_id(client_id: &str) -> Result<(), ClientIdError> {
    if client_id.is_empty() {
        return Err(ClientIdError::IsEmpty);
    }
    if client_id.len() > 23 {
        return Err(ClientIdError::TooLong);
    }
    if !client_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ClientIdError::InvalidChars);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// String is longer than a two-byte length prefix can hold.
    TooLong,

    /// String contains an embedded U+0000, which MQTT-1.5.4-2 forbids.
    NullChar,

    /// Bytes read off the wire were not valid UTF-8.
    InvalidUtf8,
}

/// Validate a string per MQTT-1.5.4: length fits in a u16 and no embedded
/// U+0000.
pub fn validate_utf8_string(s: &str) -> Result<(), StringError> {
    if s.len() > u16::MAX as usize {
        return Err(StringError::TooLong);
    }
    if s.contains('\u{0000}') {
        return Err(StringError::NullChar);
    }
    Ok(())
}

/// Parse a byte slice read off the wire as a UTF-8 string, applying the same
/// validation as [`validate_utf8_string`].
pub fn to_utf8_string(bytes: &[u8]) -> Result<String, StringError> {
    let s = String::from_utf8(bytes.to_vec()).map_err(|_e| StringError::InvalidUtf8)?;
    validate_utf8_string(&s)?;
    Ok(s)
}

/// Validate that `data` fits in a two-byte length prefix (Binary Data,
/// §1.5.6).
pub fn validate_two_bytes_data(data: &[u8]) -> Result<(), StringError> {
    if data.len() > u16::MAX as usize {
        return Err(StringError::TooLong);
    }
    Ok(())
}
