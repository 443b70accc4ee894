//! Text decoding for share files.
//!
//! Test-machine files are written by legacy Windows tooling and are often
//! Latin-1 rather than UTF-8. Decoding remembers which encoding was found so
//! a read-modify-write puts back exactly the bytes it did not touch.

use crate::error::EditError;

/// Encoding a file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Latin1,
}

/// Decode bytes as UTF-8, falling back to Latin-1.
pub fn decode(bytes: &[u8]) -> (String, TextEncoding) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_string(), TextEncoding::Utf8),
        Err(_) => (
            bytes.iter().map(|&b| char::from(b)).collect(),
            TextEncoding::Latin1,
        ),
    }
}

impl TextEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "Latin-1",
        }
    }

    /// First character of `text` this encoding cannot store.
    pub fn unencodable(self, text: &str) -> Option<char> {
        match self {
            Self::Utf8 => None,
            Self::Latin1 => text.chars().find(|&c| u32::from(c) > 0xFF),
        }
    }
}

/// Reject `value` for `field` if `encoding` cannot store it.
pub fn check_encodable(field: &'static str, value: &str, encoding: TextEncoding) -> Result<(), EditError> {
    match encoding.unencodable(value) {
        Some(character) => Err(EditError::Unencodable {
            field,
            value: value.to_string(),
            character,
            encoding: encoding.as_str(),
        }),
        None => Ok(()),
    }
}

/// Encode text back. Characters outside Latin-1 become `?`; editors check
/// with [`TextEncoding::unencodable`] before writing.
pub fn encode(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => text.as_bytes().to_vec(),
        TextEncoding::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect(),
    }
}
