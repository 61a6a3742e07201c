//! File I/O: plain or gzip-wrapped tile bytes, with an mmap-backed read
//! fast path behind the `mmap` feature.
//!
//! Grounded on the teacher's `hypc::read_file`/`write_file` pair: the
//! feature-gated mmap-vs-`fs::read` split for reading, and a plain
//! `File::create` + `write_all` for writing. Gzip wrapping has no HYPC
//! analogue and is enriched from `ciscorn-tinygrib2`'s `flate2::write::
//! GzEncoder`/`flate2::read::GzDecoder` usage, matching this format's own
//! `.terrain` convention of shipping gzip-compressed tiles.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::tile::{GeographicBounds, TerrainTile};

/// Load and decode a tile from `path`. `gzipped` must match how the file
/// was written; there is no magic-byte sniffing.
#[cfg(feature = "mmap")]
pub fn load_from_file<P: AsRef<Path>>(
    path: P,
    bounds: GeographicBounds,
    gzipped: bool,
) -> Result<TerrainTile> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    if gzipped {
        let mut bytes = Vec::new();
        GzDecoder::new(&map[..]).read_to_end(&mut bytes)?;
        TerrainTile::decode(&bytes, bounds)
    } else {
        TerrainTile::decode(&map, bounds)
    }
}

#[cfg(not(feature = "mmap"))]
pub fn load_from_file<P: AsRef<Path>>(
    path: P,
    bounds: GeographicBounds,
    gzipped: bool,
) -> Result<TerrainTile> {
    let raw = std::fs::read(path)?;
    if gzipped {
        let mut bytes = Vec::new();
        GzDecoder::new(&raw[..]).read_to_end(&mut bytes)?;
        TerrainTile::decode(&bytes, bounds)
    } else {
        TerrainTile::decode(&raw, bounds)
    }
}

/// Encode and write `tile` to `path`, gzip-wrapping the payload if
/// requested.
pub fn save_to_file<P: AsRef<Path>>(path: P, tile: &TerrainTile, gzipped: bool) -> Result<()> {
    let bytes = tile.encode()?;
    let mut file = File::create(path)?;
    if gzipped {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(5));
        encoder.write_all(&bytes)?;
        file.write_all(&encoder.finish()?)?;
    } else {
        file.write_all(&bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Watermask;
    use crate::topology::{TopologyBuilder, TriangleSource};

    fn sample_tile() -> TerrainTile {
        let bounds = GeographicBounds::new(-10.0, -10.0, 10.0, 10.0).unwrap();
        let mut topology = TopologyBuilder::new(false);
        topology
            .add_triangle(
                TriangleSource::Triples([[-10.0, -10.0, 0.0], [10.0, -10.0, 5.0], [-10.0, 10.0, 10.0]]),
                false,
            )
            .unwrap();
        TerrainTile::from_topology(&topology, bounds, Watermask::None).unwrap()
    }

    #[test]
    fn plain_round_trip_through_a_temp_file() {
        let tile = sample_tile();
        let path = std::env::temp_dir().join("qmesh-io-test-plain.terrain");
        save_to_file(&path, &tile, false).unwrap();
        let loaded = load_from_file(&path, tile.bounds, false).unwrap();
        assert_eq!(loaded.u, tile.u);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn gzipped_round_trip_through_a_temp_file() {
        let tile = sample_tile();
        let path = std::env::temp_dir().join("qmesh-io-test-gzipped.terrain");
        save_to_file(&path, &tile, true).unwrap();
        let loaded = load_from_file(&path, tile.bounds, true).unwrap();
        assert_eq!(loaded.h, tile.h);
        std::fs::remove_file(&path).ok();
    }
}
