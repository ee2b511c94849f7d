//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod verify;

use bucketsql_core::{Bucket, Config, CoreResult, Database, Transaction};
use std::path::Path;
use thiserror::Error;

/// Errors reported by the commands themselves.
#[derive(Debug, Error)]
pub enum CliError {
    /// A segment given on the command line is not valid hex.
    #[error("segment {segment:?} is not valid hex: {source}")]
    InvalidSegment {
        /// The segment as typed.
        segment: String,
        /// The decoding failure.
        #[source]
        source: hex::FromHexError,
    },

    /// The requested bucket does not exist.
    #[error("no bucket at {0}")]
    BucketNotFound(String),

    /// Verification found problems.
    #[error("verification failed with {0} issue(s)")]
    VerificationFailed(usize),
}

/// Opens an existing database without creating it.
pub fn open_existing(path: &Path) -> CoreResult<Database> {
    Database::open_with_config(path, Config::default().create_if_missing(false))
}

/// Opens the bucket at `segments` read-only, walking down from the top.
pub fn open_path<'tx, S: AsRef<[u8]>>(
    tx: &'tx Transaction<'_>,
    segments: &[S],
) -> CoreResult<Option<Bucket<'tx>>> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(None);
    };
    let mut bucket = tx.read_bucket(first.as_ref())?;
    for segment in rest {
        bucket = match bucket {
            Some(parent) => parent.nested_bucket(segment.as_ref())?,
            None => return Ok(None),
        };
    }
    Ok(bucket)
}

/// Converts command-line segments to raw bytes.
pub fn parse_segments(segments: &[String], hex: bool) -> Result<Vec<Vec<u8>>, CliError> {
    segments
        .iter()
        .map(|segment| {
            if hex {
                hex::decode(segment).map_err(|source| CliError::InvalidSegment {
                    segment: segment.clone(),
                    source,
                })
            } else {
                Ok(segment.as_bytes().to_vec())
            }
        })
        .collect()
}

/// Renders bytes for display: printable ASCII as-is, anything else as hex.
pub fn display_bytes(bytes: &[u8]) -> String {
    if !bytes.is_empty() && bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
        String::from_utf8_lossy(bytes).into_owned()
    } else {
        format!("0x{}", hex::encode(bytes))
    }
}

/// Renders a bucket path as `seg/seg/...`.
pub fn display_path<'a>(segments: impl IntoIterator<Item = &'a [u8]>) -> String {
    segments
        .into_iter()
        .map(display_bytes)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_are_shown_verbatim() {
        assert_eq!(display_bytes(b"wallet 1"), "wallet 1");
        assert_eq!(display_bytes(b""), "0x");
        assert_eq!(display_bytes(b"\x00\xff"), "0x00ff");
    }

    #[test]
    fn paths_join_with_slash() {
        let segments: [&[u8]; 2] = [b"a", b"\x01"];
        assert_eq!(display_path(segments), "a/0x01");
    }

    #[test]
    fn hex_segments_are_decoded() {
        let parsed = parse_segments(&["00ff".to_string()], true).unwrap();
        assert_eq!(parsed, vec![vec![0x00, 0xff]]);
        assert!(parse_segments(&["zz".to_string()], true).is_err());
        assert_eq!(
            parse_segments(&["zz".to_string()], false).unwrap(),
            vec![b"zz".to_vec()]
        );
    }
}
