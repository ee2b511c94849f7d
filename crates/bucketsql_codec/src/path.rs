//! Bucket paths and their canonical identifiers.

use crate::error::{CodecError, CodecResult};
use crate::table_name::candidate_name;
use crate::varint::{write_var_bytes, VarReader};
use std::fmt;

/// The chain of bucket names from the root to a bucket.
///
/// Segments are opaque bytes. Order is significant and never permuted; a
/// zero-length segment is a legal name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketPath {
    segments: Vec<Vec<u8>>,
}

impl BucketPath {
    /// Creates the path of a top-level bucket.
    #[must_use]
    pub fn root(name: impl Into<Vec<u8>>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Creates a path from its segments, outermost first.
    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the path of the nested bucket `name` under this one.
    #[must_use]
    pub fn child(&self, name: impl Into<Vec<u8>>) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(name.into());
        Self { segments }
    }

    /// Returns the enclosing path, or `None` for a top-level bucket.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns the segments, outermost first.
    #[must_use]
    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Returns the nesting depth.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the empty path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Encodes this path into its canonical identifier.
    #[must_use]
    pub fn to_id(&self) -> BucketId {
        BucketId::encode(self)
    }
}

/// Canonical encoding of a [`BucketPath`].
///
/// Each segment is written as a compact-size length followed by its bytes,
/// outermost first. Length framing makes the encoding injective: two paths
/// share an identifier only if they are equal.
///
/// A child's identifier is its parent's identifier with one more framed
/// segment appended, so descendants of a bucket share its identifier as a
/// byte prefix.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketId(Vec<u8>);

impl BucketId {
    /// Encodes a path.
    #[must_use]
    pub fn encode(path: &BucketPath) -> Self {
        let mut bytes = Vec::new();
        for segment in path.segments() {
            write_var_bytes(&mut bytes, segment);
        }
        Self(bytes)
    }

    /// Returns the identifier of a top-level bucket.
    #[must_use]
    pub fn root(name: &[u8]) -> Self {
        let mut bytes = Vec::new();
        write_var_bytes(&mut bytes, name);
        Self(bytes)
    }

    /// Returns the identifier of the nested bucket `name`.
    #[must_use]
    pub fn child(&self, name: &[u8]) -> Self {
        let mut bytes = self.0.clone();
        write_var_bytes(&mut bytes, name);
        Self(bytes)
    }

    /// Validates identifier bytes read back from storage.
    ///
    /// # Errors
    ///
    /// Fails if the bytes are empty or not a sequence of framed segments.
    pub fn from_bytes(bytes: Vec<u8>) -> CodecResult<Self> {
        if bytes.is_empty() {
            return Err(CodecError::EmptyIdentifier);
        }
        let mut reader = VarReader::new(&bytes);
        while !reader.is_empty() {
            reader.read_var_bytes()?;
        }
        Ok(Self(bytes))
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the identifier, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Iterates over the decoded segments, outermost first.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            reader: VarReader::new(&self.0),
        }
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Returns true if `self` names `other` or one of its descendants.
    #[must_use]
    pub fn is_within(&self, other: &BucketId) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Decodes back into a path.
    #[must_use]
    pub fn to_path(&self) -> BucketPath {
        BucketPath::from_segments(self.segments().map(<[u8]>::to_vec))
    }
}

impl From<&BucketPath> for BucketId {
    fn from(path: &BucketPath) -> Self {
        Self::encode(path)
    }
}

impl AsRef<[u8]> for BucketId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BucketId")
            .field(&candidate_name(self, 0).as_str())
            .finish()
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(candidate_name(self, 0).as_str())
    }
}

/// Iterator over the segments of a [`BucketId`].
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    reader: VarReader<'a>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_empty() {
            return None;
        }
        // Framing is validated on construction.
        self.reader.read_var_bytes().ok()
    }
}
