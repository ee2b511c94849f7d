//! Encoding test vectors for BucketSQL.
//!
//! Bucket identifiers are stored in the catalog and table names are baked
//! into the schema, so both encodings must never drift between releases.
//! These vectors pin them down and can be exported as JSON for tools that
//! read a database without this crate.

use bucketsql_codec::{candidate_name, BucketId, BucketPath};
use serde::{Deserialize, Serialize};

/// A path and the names it must encode to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Path segments, hex-encoded, outermost first.
    pub segments_hex: Vec<String>,
    /// Disambiguator passed to the table name derivation.
    pub disambiguator: u64,
    /// Expected canonical identifier (hex-encoded).
    pub expected_id_hex: String,
    /// Expected table name.
    pub expected_table: String,
}

/// Raw identifier bytes and whether they must decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Identifier bytes (hex-encoded).
    pub input_hex: String,
    /// Expected number of segments, or `None` if decoding must fail.
    pub expected_depth: Option<usize>,
}

fn path_vector(
    id: &str,
    description: &str,
    segments: &[&[u8]],
    disambiguator: u64,
    expected_id_hex: &str,
    expected_table: &str,
) -> PathVector {
    PathVector {
        id: id.into(),
        description: description.into(),
        segments_hex: segments.iter().map(hex::encode).collect(),
        disambiguator,
        expected_id_hex: expected_id_hex.into(),
        expected_table: expected_table.into(),
    }
}

/// Path encoding and table name vectors.
pub fn path_vectors() -> Vec<PathVector> {
    let long = [b'a'; 253];
    let long_id = format!("fdfd00{}", "61".repeat(253));
    let long_table = format!("bkt-{}", "a".repeat(56));

    vec![
        path_vector(
            "top_level",
            "Single alphanumeric segment",
            &[b"acct"],
            0,
            "0461636374",
            "bkt-acct",
        ),
        path_vector(
            "nested",
            "Two segments are framed separately",
            &[b"a", b"b"],
            0,
            "01610162",
            "bkt-a-b",
        ),
        path_vector(
            "joined",
            "Concatenated segments differ from nesting",
            &[b"ab"],
            0,
            "026162",
            "bkt-ab",
        ),
        path_vector(
            "empty_segment",
            "Zero-length top-level name",
            &[b""],
            0,
            "00",
            "bkt-",
        ),
        path_vector(
            "two_empty_segments",
            "Zero-length name nested in a zero-length name",
            &[b"", b""],
            0,
            "0000",
            "bkt--",
        ),
        path_vector(
            "escaped",
            "Punctuation and control bytes collapse to the placeholder",
            &[b"a.b", b"\x00\xff"],
            0,
            "03612e620200ff",
            "bkt-a_b-__",
        ),
        path_vector(
            "disambiguated",
            "Second bucket on a colliding candidate",
            &[b"a/b"],
            2,
            "03612f62",
            "bkt-a_b-u2",
        ),
        path_vector(
            "hex_suffix",
            "Disambiguator is written in lowercase hex",
            &[b"x"],
            0xab,
            "0178",
            "bkt-x-uab",
        ),
        PathVector {
            id: "long_segment".into(),
            description: "Segment past the one-byte length form, truncated name".into(),
            segments_hex: vec![hex::encode(long)],
            disambiguator: 0,
            expected_id_hex: long_id,
            expected_table: long_table,
        },
    ]
}

/// Identifier decoding vectors.
pub fn decode_vectors() -> Vec<DecodeVector> {
    let vector = |id: &str, description: &str, input_hex: &str, depth: Option<usize>| DecodeVector {
        id: id.into(),
        description: description.into(),
        input_hex: input_hex.into(),
        expected_depth: depth,
    };
    vec![
        vector("single", "One framed segment", "0461636374", Some(1)),
        vector("empty_segments", "Two zero-length segments", "0000", Some(2)),
        vector("empty_input", "An identifier has at least one segment", "", None),
        vector("truncated", "Length prefix longer than the data", "05616263", None),
        vector("non_minimal", "Length 1 written in the three-byte form", "fd010061", None),
        vector("dangling_marker", "Marker byte without its length", "fd", None),
    ]
}

/// Exports all vectors as pretty-printed JSON.
pub fn all_vectors_json() -> String {
    #[derive(Serialize)]
    struct AllVectors {
        path: Vec<PathVector>,
        decode: Vec<DecodeVector>,
    }

    let all = AllVectors {
        path: path_vectors(),
        decode: decode_vectors(),
    };
    serde_json::to_string_pretty(&all).unwrap_or_default()
}

/// Decodes a vector's segments into a path.
///
/// # Panics
///
/// Panics if a segment is not valid hex.
pub fn vector_path(vector: &PathVector) -> BucketPath {
    BucketPath::from_segments(
        vector
            .segments_hex
            .iter()
            .map(|segment| hex::decode(segment).expect("Invalid hex in test vector")),
    )
}

/// Checks a path vector against the codec, returning a description of the
/// first mismatch.
pub fn check_path_vector(vector: &PathVector) -> Result<(), String> {
    let id = BucketId::encode(&vector_path(vector));
    let id_hex = hex::encode(id.as_bytes());
    if id_hex != vector.expected_id_hex {
        return Err(format!(
            "{}: identifier {id_hex}, expected {}",
            vector.id, vector.expected_id_hex
        ));
    }
    let table = candidate_name(&id, vector.disambiguator);
    if table.as_str() != vector.expected_table {
        return Err(format!(
            "{}: table {table}, expected {}",
            vector.id, vector.expected_table
        ));
    }
    Ok(())
}
