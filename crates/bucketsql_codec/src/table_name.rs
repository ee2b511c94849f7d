//! Derivation of relational table names from bucket identifiers.
//!
//! A candidate name is `bkt`, then `-` plus each segment with every byte
//! escaped, then `-u<hex>` when a disambiguator is in play. Letters and
//! digits pass through; every other byte becomes `_`. The escape is lossy
//! and long names are truncated, so different buckets can share a candidate.
//! The catalog resolves collisions by retrying with the next disambiguator.

use crate::error::{CodecError, CodecResult};
use crate::path::BucketId;
use std::fmt;

/// Literal tag every generated table name starts with.
pub const TABLE_PREFIX: &str = "bkt";

/// Separator written before each segment.
pub const SEGMENT_SEPARATOR: char = '-';

/// Replacement for any byte that is not an ASCII letter or digit.
pub const ESCAPE_PLACEHOLDER: char = '_';

/// Maximum length of a generated table name, suffix included.
pub const MAX_TABLE_NAME_LEN: usize = 60;

/// Maps one byte of a segment to its identifier-safe form.
#[inline]
#[must_use]
pub const fn escape_byte(byte: u8) -> char {
    if byte.is_ascii_alphanumeric() {
        byte as char
    } else {
        ESCAPE_PLACEHOLDER
    }
}

/// Builds the table name candidate for `id`.
///
/// `disambiguator == 0` yields the plain name; larger values append
/// `-u<hex>`. The body is cut so the whole name fits in
/// [`MAX_TABLE_NAME_LEN`] characters.
#[must_use]
pub fn candidate_name(id: &BucketId, disambiguator: u64) -> TableName {
    let mut body = String::from(TABLE_PREFIX);
    for segment in id.segments() {
        body.push(SEGMENT_SEPARATOR);
        body.extend(segment.iter().map(|&b| escape_byte(b)));
    }

    let suffix = if disambiguator > 0 {
        format!("{SEGMENT_SEPARATOR}u{disambiguator:x}")
    } else {
        String::new()
    };

    // Every character is ASCII, so byte truncation is safe.
    body.truncate(MAX_TABLE_NAME_LEN - suffix.len());
    body.push_str(&suffix);
    TableName(body)
}

/// A generated table name.
///
/// Always matches `bkt[A-Za-z0-9_-]*` and is at most
/// [`MAX_TABLE_NAME_LEN`] characters long.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableName(String);

impl TableName {
    /// Validates a name read back from the catalog.
    ///
    /// # Errors
    ///
    /// Fails if the name is outside the generated alphabet or too long.
    pub fn parse(name: impl Into<String>) -> CodecResult<Self> {
        let name = name.into();
        if !name.starts_with(TABLE_PREFIX) {
            return Err(CodecError::invalid_table_name(
                name,
                format!("missing {TABLE_PREFIX:?} prefix"),
            ));
        }
        if name.len() > MAX_TABLE_NAME_LEN {
            return Err(CodecError::invalid_table_name(
                name,
                format!("longer than {MAX_TABLE_NAME_LEN} characters"),
            ));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == ESCAPE_PLACEHOLDER || *c == SEGMENT_SEPARATOR))
        {
            return Err(CodecError::invalid_table_name(
                name.clone(),
                format!("character {bad:?} is not allowed"),
            ));
        }
        Ok(Self(name))
    }

    /// Returns the bare name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as a double-quoted SQL identifier.
    ///
    /// The alphabet contains no quote characters, so no escaping is needed.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Consumes the name, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
