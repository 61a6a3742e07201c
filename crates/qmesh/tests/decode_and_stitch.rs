//! End-to-end smoke test: build two adjacent tiles from topology, round
//! trip each through the wire codec, stitch their shared edge, and save
//! the result through the file-convenience layer.

use qmesh::editable::EditableTile;
use qmesh::stitch::{stitch, Neighbors};
use qmesh::tile::{GeographicBounds, TerrainTile, Watermask};
use qmesh::topology::{TopologyBuilder, TriangleSource};

fn tile_over(bounds: GeographicBounds) -> TerrainTile {
    let mut topology = TopologyBuilder::new(true);
    topology
        .add_triangle(
            TriangleSource::Triples([
                [bounds.west, bounds.south, 0.0],
                [bounds.east, bounds.south, 5.0],
                [bounds.west, bounds.north, 10.0],
            ]),
            false,
        )
        .unwrap();
    topology
        .add_triangle(
            TriangleSource::Triples([
                [bounds.east, bounds.south, 5.0],
                [bounds.east, bounds.north, 15.0],
                [bounds.west, bounds.north, 10.0],
            ]),
            false,
        )
        .unwrap();
    topology.finish();
    TerrainTile::from_topology(&topology, bounds, Watermask::None).unwrap()
}

#[test]
fn build_round_trip_stitch_and_save() {
    env_logger::init();

    let west_bounds = GeographicBounds::new(-10.0, -10.0, 0.0, 10.0).unwrap();
    let east_bounds = GeographicBounds::new(0.0, -10.0, 10.0, 10.0).unwrap();

    let west_tile = tile_over(west_bounds);
    let east_tile = tile_over(east_bounds);

    // The codec must be bit-exact before anything else is worth testing.
    let west_bytes = west_tile.encode().unwrap();
    let west_decoded = TerrainTile::decode(&west_bytes, west_bounds).unwrap();
    assert_eq!(west_decoded.u, west_tile.u);
    assert_eq!(west_decoded.indices, west_tile.indices);

    let mut center = EditableTile::new(west_decoded);
    let mut neighbor = EditableTile::new(TerrainTile::decode(&east_tile.encode().unwrap(), east_bounds).unwrap());

    let mut neighbors = Neighbors::default();
    neighbors.east = Some(&mut neighbor);
    stitch(&mut center, &mut neighbors).unwrap();

    assert!(!center.get_edge_vertices(qmesh::editable::Edge::East).is_empty());

    let saved = std::env::temp_dir().join("qmesh-integration-stitched.terrain");
    qmesh::io::save_to_file(&saved, &center.tile, true).unwrap();
    let reloaded = qmesh::io::load_from_file(&saved, west_bounds, true).unwrap();
    assert_eq!(reloaded.vertex_count(), center.tile.vertex_count());
    std::fs::remove_file(&saved).ok();
}
