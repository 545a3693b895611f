//! Source encodings and the body re-encoding heuristic.

use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, REPLACEMENT, UTF_8};
use thiserror::Error;

/// Errors raised while resolving an encoding label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingLabelError {
    /// The label does not name any known encoding.
    #[error("unknown encoding label '{label}'")]
    Unknown {
        /// Label that failed to resolve.
        label: String,
    },

    /// The label resolves to the WHATWG replacement encoding, which cannot
    /// decode anything.
    #[error("encoding label '{label}' maps to the replacement encoding and cannot be decoded")]
    Unsupported {
        /// Label that resolved to the replacement encoding.
        label: String,
    },
}

/// Text encoding a language server is assumed to use for frame bodies.
///
/// Labels follow the WHATWG Encoding Standard, so the usual aliases resolve
/// (`utf8`, `gbk`, `gb2312`, `shift_jis`, `latin1`, `windows-1252`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceEncoding(&'static Encoding);

impl SourceEncoding {
    /// The canonical encoding every body is normalised to.
    #[must_use]
    pub fn canonical() -> Self {
        Self(UTF_8)
    }

    /// Resolves an encoding label.
    ///
    /// # Errors
    ///
    /// Returns [`EncodingLabelError::Unknown`] when the label is not
    /// recognised and [`EncodingLabelError::Unsupported`] when it resolves to
    /// the replacement encoding.
    pub fn from_label(label: &str) -> Result<Self, EncodingLabelError> {
        let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
            EncodingLabelError::Unknown {
                label: label.to_owned(),
            }
        })?;
        if encoding == REPLACEMENT {
            return Err(EncodingLabelError::Unsupported {
                label: label.to_owned(),
            });
        }
        Ok(Self(encoding))
    }

    /// Wraps an `encoding_rs` encoding directly.
    #[must_use]
    pub const fn from_encoding(encoding: &'static Encoding) -> Self {
        Self(encoding)
    }

    /// Returns the canonical name of the encoding (for example `GBK`).
    #[must_use]
    pub fn name(self) -> &'static str {
        self.0.name()
    }

    /// Returns the underlying `encoding_rs` encoding.
    #[must_use]
    pub const fn as_encoding(self) -> &'static Encoding {
        self.0
    }

    /// Returns true when bodies in this encoding are already canonical.
    #[must_use]
    pub fn is_canonical(self) -> bool {
        self.0 == UTF_8
    }
}

impl Default for SourceEncoding {
    fn default() -> Self {
        Self::canonical()
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceEncoding {
    type Err = EncodingLabelError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Self::from_label(label)
    }
}

/// Result of applying the re-encoding rule to one frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reencoded {
    /// The body decoded cleanly but holds no multi-byte characters, or the
    /// source encoding is already canonical.
    Unchanged(Vec<u8>),
    /// The body held multi-byte characters and was converted to UTF-8.
    Converted(Vec<u8>),
    /// The body is not valid in the source encoding and was kept verbatim.
    Undecodable(Vec<u8>),
}

impl Reencoded {
    /// Returns the body bytes to emit.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Unchanged(bytes) | Self::Converted(bytes) | Self::Undecodable(bytes) => bytes,
        }
    }

    /// Returns true when the body was rewritten.
    #[must_use]
    pub const fn is_converted(&self) -> bool {
        matches!(self, Self::Converted(_))
    }

    /// Short label used in log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged(_) => "unchanged",
            Self::Converted(_) => "converted",
            Self::Undecodable(_) => "undecodable",
        }
    }
}

/// Applies the re-encoding rule to a complete frame body.
///
/// The body is decoded strictly, without BOM sniffing and without
/// replacement characters. A body that fails to decode is kept as is. A body
/// that decodes to as many characters as it has bytes is single-byte text and
/// is kept as is. Only a body that decodes to fewer characters than bytes is
/// rewritten as UTF-8.
#[must_use]
pub fn reencode_body(encoding: SourceEncoding, body: Vec<u8>) -> Reencoded {
    if encoding.is_canonical() {
        return Reencoded::Unchanged(body);
    }

    let decoded = encoding
        .as_encoding()
        .decode_without_bom_handling_and_without_replacement(&body)
        .map(|text| (text.chars().count() < body.len()).then(|| text.into_owned()));

    match decoded {
        None => Reencoded::Undecodable(body),
        Some(None) => Reencoded::Unchanged(body),
        Some(Some(text)) => Reencoded::Converted(text.into_bytes()),
    }
}
