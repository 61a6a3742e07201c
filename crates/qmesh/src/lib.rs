//! Reader, writer, and editor for quantized-mesh terrain tiles.
//!
//! - [`geodesy`]: WGS84 geodetic/ECEF conversion.
//! - [`binary`]: little-endian pack/unpack, zig-zag, index, and
//!   oct-normal coding.
//! - [`bounds`]: bounding-sphere and horizon-occlusion-point math.
//! - [`topology`]: triangle ingestion, vertex dedup, lighting normals.
//! - [`tile`]: the on-disk [`tile::TerrainTile`] and its codec.
//! - [`editable`]: mutation of a loaded tile ([`editable::EditableTile`]).
//! - [`stitch`]: reconciling a tile against its neighbors.
//! - [`io`]: loading and saving tile files, gzip-wrapped or not.

pub mod binary;
pub mod bounds;
pub mod editable;
pub mod error;
pub mod geodesy;
pub mod io;
pub mod stitch;
pub mod tile;
pub mod topology;

pub use editable::{Edge, EditableTile};
pub use error::{Error, Result};
pub use stitch::{stitch, Neighbors, Side};
pub use tile::{GeographicBounds, TerrainTile, TileHeader, Watermask};
pub use topology::{TopologyBuilder, TopologyVertex, TriangleSource};

/// The HTTP `Content-Type` string for a tile with the given extensions
/// present, per the quantized-mesh media type registration.
pub fn content_type(has_lighting: bool, has_watermask: bool) -> &'static str {
    match (has_lighting, has_watermask) {
        (false, false) => "application/vnd.quantized-mesh",
        (true, false) => "application/vnd.quantized-mesh;extensions=octvertexnormals",
        (false, true) => "application/vnd.quantized-mesh;extensions=watermask",
        (true, true) => "application/vnd.quantized-mesh;extensions=octvertexnormals-watermask",
    }
}
