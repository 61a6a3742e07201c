use thiserror::Error;

/// Errors surfaced by the codec, topology builder, editable tile, and stitcher.
///
/// Every top-level operation (`decode`, `encode`, `stitch`, the topology
/// builder's ingestion methods) returns `Result<_, Error>`. There are no
/// retries anywhere in this crate; a failed stitch may leave the tiles it
/// touched partially edited and they should be discarded by the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Truncated stream, trailing bytes after declared content, an invalid
    /// watermask length, or an unknown extension id.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A polygon without a Z component, non-triangular geometry with
    /// autocorrect disabled, or invalid WKT/WKB.
    #[error("invalid geometry: {0}")]
    GeometryInvalid(String),

    /// An attempt to oct-encode a vector that isn't (close to) unit length.
    #[error("normalization failure: {0}")]
    NormalizationFailure(String),

    /// Bounding-sphere construction with fewer than 2 points.
    #[error("empty bounding input: need at least 2 points, got {0}")]
    EmptyBoundingInput(usize),

    /// A requested neighbor doesn't share an edge with the center tile, or a
    /// required adjacent triangle is missing from a corrupt mesh.
    #[error("stitch mismatch: {0}")]
    StitchMismatch(String),

    /// A post-edit rebuild found mismatched array lengths.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Filesystem or codec I/O errors, bubbled unchanged.
    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
