//! WOPI protocol headers and operation names.

use crate::error::{Result, WopiError};
use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const OVERRIDE: &str = "X-WOPI-Override";
pub const LOCK: &str = "X-WOPI-Lock";
pub const OLD_LOCK: &str = "X-WOPI-OldLock";
pub const ITEM_VERSION: &str = "X-WOPI-ItemVersion";
pub const REQUESTED_NAME: &str = "X-WOPI-RequestedName";
pub const SUGGESTED_TARGET: &str = "X-WOPI-SuggestedTarget";
pub const RELATIVE_TARGET: &str = "X-WOPI-RelativeTarget";
pub const FILE_CONVERSION: &str = "X-WOPI-FileConversion";
pub const URL_TYPE: &str = "X-WOPI-UrlType";
pub const MAX_EXPECTED_SIZE: &str = "X-WOPI-MaxExpectedSize";

/// Case-insensitive request header map.
///
/// Empty values are stored but read back as absent: the protocol treats
/// a blank header like a missing one.
#[derive(Debug, Clone, Default)]
pub struct WopiHeaders {
    values: HashMap<String, String>,
}

impl WopiHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.insert(name.as_ref(), value);
        }
        headers
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Non-empty value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Non-empty value of a UTF-7 encoded header, decoded.
    pub fn get_utf7(&self, name: &str) -> Option<String> {
        self.get(name).map(decode_utf7)
    }

    /// Whether the header is present at all, blank or not.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }
}

/// Operations selected by `X-WOPI-Override` on `POST /files/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Lock,
    GetLock,
    Unlock,
    RefreshLock,
    PutRelative,
    RenameFile,
    GetShareUrl,
    /// Only valid on `POST /files/{id}/contents`.
    Put,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Lock => "LOCK",
            Operation::GetLock => "GET_LOCK",
            Operation::Unlock => "UNLOCK",
            Operation::RefreshLock => "REFRESH_LOCK",
            Operation::PutRelative => "PUT_RELATIVE",
            Operation::RenameFile => "RENAME_FILE",
            Operation::GetShareUrl => "GET_SHARE_URL",
            Operation::Put => "PUT",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = WopiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LOCK" => Ok(Operation::Lock),
            "GET_LOCK" => Ok(Operation::GetLock),
            "UNLOCK" => Ok(Operation::Unlock),
            "REFRESH_LOCK" => Ok(Operation::RefreshLock),
            "PUT_RELATIVE" => Ok(Operation::PutRelative),
            "RENAME_FILE" => Ok(Operation::RenameFile),
            "GET_SHARE_URL" => Ok(Operation::GetShareUrl),
            "PUT" => Ok(Operation::Put),
            other => Err(WopiError::BadRequest(format!(
                "unknown {} '{}'",
                OVERRIDE, other
            ))),
        }
    }
}

/// Modified-base64 engine of RFC 2152: standard alphabet, no padding,
/// leftover bits ignored.
const UTF7_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/'
}

/// Decode a UTF-7 (RFC 2152) string.
///
/// Shifted sequences that do not decode are kept verbatim.
pub fn decode_utf7(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('+') {
        out.push_str(&rest[..start]);
        let shifted = &rest[start + 1..];
        let end = shifted
            .find(|c: char| !is_base64_char(c))
            .unwrap_or(shifted.len());
        let (encoded, after) = shifted.split_at(end);
        // An explicit '-' terminator is absorbed
        let after = after.strip_prefix('-').unwrap_or(after);

        if encoded.is_empty() {
            // "+-" is a literal plus; a lone '+' is kept as is
            out.push('+');
        } else {
            match decode_shifted(encoded) {
                Some(text) => out.push_str(&text),
                None => {
                    out.push('+');
                    out.push_str(encoded);
                }
            }
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

fn decode_shifted(encoded: &str) -> Option<String> {
    let bytes = UTF7_BASE64.decode(encoded).ok()?;
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).ok()
}
