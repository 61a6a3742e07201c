//! Edge stitching: reconcile a center tile against 1..4 neighbors so the
//! shared edges become watertight and identically lit.
//!
//! No direct teacher analogue — HYPC has no multi-tile operation — so this
//! module is built straight from the edge-connection state machine this
//! format's stitcher follows, in the teacher's error-propagation and
//! `log` idiom. The normal-harmonization pass is grounded on the bilateral
//! (`_build_normals`) variant rather than the center-only
//! (`_harmonize_normals`) one: only the bilateral variant assigns the same
//! resulting normal to both sides of a connection, which is what makes
//! shared-edge lighting actually match.

use std::collections::BTreeMap;

use log::debug;

use crate::editable::{Edge, EditableTile};
use crate::error::{Error, Result};
use crate::geodesy::{llh_to_ecef, triangle_area, Vec3};

/// Which of the four tile edges a neighbor sits across.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    West,
    South,
    East,
    North,
}

impl Side {
    fn center_edge(self) -> Edge {
        match self {
            Side::West => Edge::West,
            Side::South => Edge::South,
            Side::East => Edge::East,
            Side::North => Edge::North,
        }
    }

    fn neighbor_edge(self) -> Edge {
        match self {
            Side::West => Edge::East,
            Side::South => Edge::North,
            Side::East => Edge::West,
            Side::North => Edge::South,
        }
    }

    /// North/south edges key their connections by `u`; west/east edges key
    /// by `v` — the axis each edge runs along.
    fn keys_by_u(self) -> bool {
        matches!(self, Side::South | Side::North)
    }
}

/// Up to one neighbor per side, each sharing validated adjacent bounds with
/// the center tile.
#[derive(Default)]
pub struct Neighbors<'a> {
    pub west: Option<&'a mut EditableTile>,
    pub south: Option<&'a mut EditableTile>,
    pub east: Option<&'a mut EditableTile>,
    pub north: Option<&'a mut EditableTile>,
}

impl<'a> Neighbors<'a> {
    fn get_mut(&mut self, side: Side) -> Option<&mut EditableTile> {
        match side {
            Side::West => self.west.as_deref_mut(),
            Side::South => self.south.as_deref_mut(),
            Side::East => self.east.as_deref_mut(),
            Side::North => self.north.as_deref_mut(),
        }
    }

    fn present_sides(&self) -> Vec<Side> {
        [Side::West, Side::South, Side::East, Side::North]
            .into_iter()
            .filter(|&s| match s {
                Side::West => self.west.is_some(),
                Side::South => self.south.is_some(),
                Side::East => self.east.is_some(),
                Side::North => self.north.is_some(),
            })
            .collect()
    }
}

/// One shared-edge position: the vertex each side contributes, if any. A
/// freshly-assembled connection has exactly one side populated unless both
/// tiles happen to already share a vertex there; stitching fills in
/// whichever side is missing.
#[derive(Debug, Clone, Copy)]
struct EdgeConnection {
    key: u16,
    center: Option<u32>,
    neighbor: Option<u32>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Owner {
    Center,
    Neighbor,
}

/// Reconcile `center` against every present neighbor: validate adjacency,
/// assemble edge connections, split triangles to repair incomplete
/// connections, average heights, then harmonize normals across every
/// touched edge.
pub fn stitch(center: &mut EditableTile, neighbors: &mut Neighbors<'_>) -> Result<()> {
    let sides = neighbors.present_sides();
    for &side in &sides {
        let neighbor = neighbors.get_mut(side).unwrap();
        validate_adjacency(center, neighbor, side)?;
    }

    let mut touched: Vec<(Side, Vec<EdgeConnection>)> = Vec::new();
    for &side in &sides {
        let neighbor = neighbors.get_mut(side).unwrap();
        let connections = stitch_edge(center, neighbor, side)?;
        touched.push((side, connections));
    }

    center.rebuild_h();
    for &side in &sides {
        neighbors.get_mut(side).unwrap().rebuild_h();
    }

    for (side, connections) in &touched {
        let neighbor = neighbors.get_mut(*side).unwrap();
        harmonize_normals(center, neighbor, connections)?;
    }

    Ok(())
}

fn validate_adjacency(center: &EditableTile, neighbor: &EditableTile, side: Side) -> Result<()> {
    let c = center.bounds();
    let n = neighbor.bounds();
    let ok = match side {
        Side::West => c.west == n.east,
        Side::East => c.east == n.west,
        Side::South => c.south == n.north,
        Side::North => c.north == n.south,
    };
    if !ok {
        return Err(Error::StitchMismatch(format!(
            "neighbor on {side:?} does not share the expected edge (center={c:?}, neighbor={n:?})"
        )));
    }
    Ok(())
}

fn key_of(tile: &EditableTile, index: u32, keys_by_u: bool) -> u16 {
    if keys_by_u {
        tile.tile.u[index as usize]
    } else {
        tile.tile.v[index as usize]
    }
}

/// Build the sorted edge-connection list for one side, then repair every
/// incomplete connection by splitting the triangle it straddles.
fn stitch_edge(
    center: &mut EditableTile,
    neighbor: &mut EditableTile,
    side: Side,
) -> Result<Vec<EdgeConnection>> {
    let keys_by_u = side.keys_by_u();
    let center_vertices = center.get_edge_vertices(side.center_edge());
    let neighbor_vertices = neighbor.get_edge_vertices(side.neighbor_edge());

    let mut by_key: BTreeMap<u16, EdgeConnection> = BTreeMap::new();
    for v in center_vertices {
        let key = key_of(center, v, keys_by_u);
        by_key.insert(
            key,
            EdgeConnection {
                key,
                center: Some(v),
                neighbor: None,
            },
        );
    }
    for v in neighbor_vertices {
        let key = key_of(neighbor, v, keys_by_u);
        by_key
            .entry(key)
            .and_modify(|c| c.neighbor = Some(v))
            .or_insert(EdgeConnection {
                key,
                center: None,
                neighbor: Some(v),
            });
    }

    let mut connections: Vec<EdgeConnection> = by_key.into_values().collect();

    for i in 0..connections.len() {
        match (connections[i].center, connections[i].neighbor) {
            (Some(c), Some(n)) => {
                let h = (center.get_height(c as usize) + neighbor.get_height(n as usize)) / 2.0;
                center.set_height(c as usize, h);
                neighbor.set_height(n as usize, h);
            }
            (Some(c), None) => {
                let v_prev = find_adjacent(&connections, i, Owner::Neighbor, -1)?;
                let v_next = find_adjacent(&connections, i, Owner::Neighbor, 1)?;
                let tri = neighbor
                    .find_triangle_with_edge(v_prev, v_next)
                    .ok_or_else(|| {
                        Error::StitchMismatch(format!(
                            "no neighbor triangle spans vertices {v_prev}/{v_next} on {side:?}"
                        ))
                    })?;
                let insert_at = center.get_llh(c as usize);
                let new_v = neighbor.split_triangle(tri, v_prev, v_next, insert_at)?;
                connections[i].neighbor = Some(new_v);
                debug!("{side:?}: repaired neighbor side of connection at key {}", connections[i].key);
            }
            (None, Some(n)) => {
                let v_prev = find_adjacent(&connections, i, Owner::Center, -1)?;
                let v_next = find_adjacent(&connections, i, Owner::Center, 1)?;
                let tri = center.find_triangle_with_edge(v_prev, v_next).ok_or_else(|| {
                    Error::StitchMismatch(format!(
                        "no center triangle spans vertices {v_prev}/{v_next} on {side:?}"
                    ))
                })?;
                let insert_at = neighbor.get_llh(n as usize);
                let new_v = center.split_triangle(tri, v_prev, v_next, insert_at)?;
                connections[i].center = Some(new_v);
                debug!("{side:?}: repaired center side of connection at key {}", connections[i].key);
            }
            (None, None) => unreachable!("a connection must own at least one side"),
        }
    }

    Ok(connections)
}

/// Find the nearest connection, scanning away from `index` in `direction`
/// (`-1` toward lower keys, `+1` toward higher), whose requested side is
/// populated. Fails rather than wrapping or falling back to `index` itself
/// — an edge connection with no eligible neighbor in that direction cannot
/// be repaired.
fn find_adjacent(
    connections: &[EdgeConnection],
    index: usize,
    owner: Owner,
    direction: i32,
) -> Result<u32> {
    let mut i = index as i64;
    loop {
        i += direction as i64;
        if i < 0 || i as usize >= connections.len() {
            return Err(Error::StitchMismatch(
                "no adjacent edge connection available to repair this vertex".to_string(),
            ));
        }
        let c = &connections[i as usize];
        let found = match owner {
            Owner::Center => c.center,
            Owner::Neighbor => c.neighbor,
        };
        if let Some(v) = found {
            return Ok(v);
        }
    }
}

fn triangles_containing(tile: &EditableTile, vertex: u32) -> Vec<(u32, u32, u32)> {
    tile.tile
        .indices
        .chunks_exact(3)
        .map(|c| (c[0], c[1], c[2]))
        .filter(|&(a, b, c)| a == vertex || b == vertex || c == vertex)
        .collect()
}

fn weighted_normal_sum(tile: &EditableTile, triangles: &[(u32, u32, u32)]) -> Vec3 {
    let mut sum = Vec3::ZERO;
    for &(i0, i1, i2) in triangles {
        let (lon0, lat0, h0) = tile.get_llh(i0 as usize);
        let (lon1, lat1, h1) = tile.get_llh(i1 as usize);
        let (lon2, lat2, h2) = tile.get_llh(i2 as usize);
        let v0 = llh_to_ecef(lon0, lat0, h0);
        let v1 = llh_to_ecef(lon1, lat1, h1);
        let v2 = llh_to_ecef(lon2, lat2, h2);

        let normal = v1.sub(v0).cross(v2.sub(v0));
        let weight = triangle_area(v0, v1);
        sum = sum.add(normal.scale(weight));
    }
    sum
}

/// For each connection, sum area-weighted face normals over every triangle
/// touching either side's vertex, normalize, and set the same normal on
/// both sides — the union guarantees identical lighting across the seam.
fn harmonize_normals(
    center: &mut EditableTile,
    neighbor: &mut EditableTile,
    connections: &[EdgeConnection],
) -> Result<()> {
    for c in connections {
        let (Some(center_v), Some(neighbor_v)) = (c.center, c.neighbor) else {
            return Err(Error::InvariantViolation(
                "edge connection left incomplete after stitching".to_string(),
            ));
        };

        let center_triangles = triangles_containing(center, center_v);
        let neighbor_triangles = triangles_containing(neighbor, neighbor_v);

        let mut normal = weighted_normal_sum(center, &center_triangles);
        normal = normal.add(weighted_normal_sum(neighbor, &neighbor_triangles));
        let normal = normal.normalized();

        center.set_normal(center_v as usize, normal);
        neighbor.set_normal(neighbor_v as usize, normal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{GeographicBounds, TerrainTile, Watermask};
    use crate::topology::{TopologyBuilder, TriangleSource};

    fn flat_tile(west: f64, south: f64, east: f64, north: f64) -> EditableTile {
        let bounds = GeographicBounds::new(west, south, east, north).unwrap();
        let mut topology = TopologyBuilder::new(true);
        topology
            .add_triangle(
                TriangleSource::Triples([[west, south, 0.0], [east, south, 0.0], [west, north, 0.0]]),
                false,
            )
            .unwrap();
        topology
            .add_triangle(
                TriangleSource::Triples([[east, south, 0.0], [east, north, 0.0], [west, north, 0.0]]),
                false,
            )
            .unwrap();
        topology.finish();
        let tile = TerrainTile::from_topology(&topology, bounds, Watermask::None).unwrap();
        EditableTile::new(tile)
    }

    #[test]
    fn adjacency_mismatch_is_rejected() {
        let mut center = flat_tile(-10.0, -10.0, 0.0, 10.0);
        let mut wrong_neighbor = flat_tile(5.0, -10.0, 15.0, 10.0);
        let mut neighbors = Neighbors {
            east: Some(&mut wrong_neighbor),
            ..Default::default()
        };
        let err = stitch(&mut center, &mut neighbors).unwrap_err();
        assert!(matches!(err, Error::StitchMismatch(_)));
    }

    #[test]
    fn shared_edge_vertices_are_height_averaged() {
        let mut center = flat_tile(-10.0, -10.0, 0.0, 10.0);
        for v in center.get_edge_vertices(Edge::East) {
            center.set_height(v as usize, 10.0);
        }
        center.rebuild_h();

        let mut east_neighbor = flat_tile(0.0, -10.0, 10.0, 10.0);
        for v in east_neighbor.get_edge_vertices(Edge::West) {
            east_neighbor.set_height(v as usize, 0.0);
        }
        east_neighbor.rebuild_h();

        let mut neighbors = Neighbors {
            east: Some(&mut east_neighbor),
            ..Default::default()
        };
        stitch(&mut center, &mut neighbors).unwrap();

        for v in center.get_edge_vertices(Edge::East) {
            assert!((center.get_height(v as usize) - 5.0).abs() < 1e-2);
        }
        for v in east_neighbor.get_edge_vertices(Edge::West) {
            assert!((east_neighbor.get_height(v as usize) - 5.0).abs() < 1e-2);
        }
    }
}
