//! Triangle ingestion and per-vertex topology: dedup, counter-clockwise
//! reorientation, and area-weighted normal accumulation.
//!
//! `TopologyBuilder` is the `TerrainTile`-free half of mesh assembly: it
//! owns a growing vertex/face list and is handed to [`crate::tile`] once
//! complete. Grounded on the teacher's `obj2hypc::parse_obj_vertices`,
//! which reads a foreign text format (OBJ) into the same flat `Vec<[f64;
//! 3]>` the rest of that binary's pipeline consumes regardless of where
//! the vertices came from — this module generalizes that "funnel every
//! input form into one vertex vector" shape to three input forms instead
//! of one.

use std::collections::HashMap;

use crate::binary::ByteReader;
use crate::error::{Error, Result};
use crate::geodesy::{llh_to_ecef, triangle_area, Vec3};

/// The three equivalent ways to hand a triangle to the topology builder.
pub enum TriangleSource<'a> {
    /// Three `[lon, lat, height]` vertices, already in ingestion order.
    Triples([[f64; 3]; 3]),
    /// A `POLYGON Z` WKT string with an exterior ring of 3 or 4 points (a
    /// closed ring repeats its first point as its last).
    Wkt(&'a str),
    /// WKB bytes for a `Polygon ZM`/`Polygon Z` geometry, exterior ring only.
    Wkb(&'a [u8]),
}

/// One accumulated mesh vertex: geographic position plus its ECEF form.
#[derive(Debug, Clone, Copy)]
pub struct TopologyVertex {
    pub lon: f64,
    pub lat: f64,
    pub height: f64,
    pub ecef: Vec3,
}

/// Accumulates deduplicated vertices and their triangle faces from a
/// sequence of [`TriangleSource`] inputs, with optional per-vertex
/// normal computation.
#[derive(Default)]
pub struct TopologyBuilder {
    vertices: Vec<TopologyVertex>,
    faces: Vec<[u32; 3]>,
    lookup: HashMap<String, u32>,
    has_lighting: bool,
    normals: Vec<Vec3>,
}

impl TopologyBuilder {
    pub fn new(has_lighting: bool) -> Self {
        TopologyBuilder {
            vertices: Vec::new(),
            faces: Vec::new(),
            lookup: HashMap::new(),
            has_lighting,
            normals: Vec::new(),
        }
    }

    pub fn vertices(&self) -> &[TopologyVertex] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    /// Per-vertex unit normals, populated after [`Self::finish`] if this
    /// builder was constructed with lighting enabled.
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Add one triangle from any of the three equivalent source forms.
    ///
    /// Rejects non-triangular rings unless `autocorrect` is set, in which
    /// case a longer ring (closing point already dropped) is reduced to
    /// triangles by [`collapse_into_triangles`].
    pub fn add_triangle(&mut self, source: TriangleSource<'_>, autocorrect: bool) -> Result<()> {
        let raw = match source {
            TriangleSource::Triples(t) => vec![t[0], t[1], t[2]],
            TriangleSource::Wkt(text) => parse_wkt_polygon_z(text)?,
            TriangleSource::Wkb(bytes) => parse_wkb_polygon_z(bytes)?,
        };

        for triangle in split_ring(raw, autocorrect)? {
            self.add_vertices(triangle);
        }
        Ok(())
    }

    /// Reorder `vertices` counter-clockwise, dedup each against the running
    /// lookup table, and append the resulting face.
    fn add_vertices(&mut self, vertices: [[f64; 3]; 3]) {
        let ordered = assure_counter_clockwise(vertices);

        let mut face = [0u32; 3];
        for (slot, v) in face.iter_mut().zip(ordered.iter()) {
            let key = format!("{:.14},{:.14},{:.14}", v[0], v[1], v[2]);
            *slot = *self.lookup.entry(key).or_insert_with(|| {
                let ecef = llh_to_ecef(v[0], v[1], v[2]);
                self.vertices.push(TopologyVertex {
                    lon: v[0],
                    lat: v[1],
                    height: v[2],
                    ecef,
                });
                (self.vertices.len() - 1) as u32
            });
        }
        self.faces.push(face);
    }

    /// Compute area-weighted per-vertex normals, if this builder was
    /// constructed with lighting enabled. No-op otherwise.
    pub fn finish(&mut self) {
        if !self.has_lighting {
            return;
        }
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for face in &self.faces {
            let v0 = self.vertices[face[0] as usize].ecef;
            let v1 = self.vertices[face[1] as usize].ecef;
            let v2 = self.vertices[face[2] as usize].ecef;

            let normal = v1.sub(v0).cross(v2.sub(v0));
            let contribution = normal.scale(triangle_area(v0, v1));

            for &idx in face {
                accum[idx as usize] = accum[idx as usize].add(contribution);
            }
        }
        self.normals = accum.into_iter().map(Vec3::normalized).collect();
    }
}

/// Sort three (or, after autocorrect, more) vertices counter-clockwise by
/// angle around their centroid.
fn assure_counter_clockwise(mut vertices: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mean_0 = (vertices[0][0] + vertices[1][0] + vertices[2][0]) / 3.0;
    let mean_1 = (vertices[0][1] + vertices[1][1] + vertices[2][1]) / 3.0;

    let angle = |v: &[f64; 3]| {
        let a = (v[0] - mean_0).atan2(v[1] - mean_1);
        (a + 2.0 * std::f64::consts::PI) % (2.0 * std::f64::consts::PI)
    };

    vertices.sort_by(|a, b| angle(b).partial_cmp(&angle(a)).unwrap());
    vertices
}

/// Split a ring (closing point already dropped) into one or more triangles.
/// Rings longer than 3 points require `autocorrect`, in which case they are
/// reduced by [`collapse_into_triangles`].
fn split_ring(ring: Vec<[f64; 3]>, autocorrect: bool) -> Result<Vec<[[f64; 3]; 3]>> {
    match ring.len() {
        3 => Ok(vec![[ring[0], ring[1], ring[2]]]),
        n if n > 3 && autocorrect => Ok(collapse_into_triangles(ring)),
        n => Err(Error::GeometryInvalid(format!(
            "expected a 3-point ring (or more with autocorrect), got {n} points"
        ))),
    }
}

/// Reduce an N-point path to `N - 2` triangles by repeatedly collapsing the
/// interior point whose two neighbors are closest together: emit the
/// triangle it forms with them, then remove it from the path. The first and
/// last points are never removed. Stops once 3 points remain.
fn collapse_into_triangles(mut path: Vec<[f64; 3]>) -> Vec<[[f64; 3]; 3]> {
    let mut triangles = Vec::with_capacity(path.len().saturating_sub(2));
    while path.len() > 3 {
        let mut best = 1;
        let mut best_dist = dist(path[0], path[2]);
        for i in 2..path.len() - 1 {
            let d = dist(path[i - 1], path[i + 1]);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        triangles.push([path[best - 1], path[best], path[best + 1]]);
        path.remove(best);
    }
    triangles.push([path[0], path[1], path[2]]);
    triangles
}

fn dist(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Parse the exterior ring of a `POLYGON Z ((...))` WKT string, dropping
/// the closing point if the ring repeats its first point.
///
/// This crate hand-rolls WKT/WKB parsing rather than depending on the
/// `wkt`/`wkb`/`geo-types` crates: those crates' public geometry types are
/// 2-D only and would silently drop the Z ordinate every vertex here
/// needs.
fn parse_wkt_polygon_z(text: &str) -> Result<Vec<[f64; 3]>> {
    let upper = text.trim();
    if !upper.to_ascii_uppercase().starts_with("POLYGON") {
        return Err(Error::GeometryInvalid(
            "expected a POLYGON Z WKT string".to_string(),
        ));
    }

    let open = text.find('(').ok_or_else(|| {
        Error::GeometryInvalid("WKT polygon missing '(' after POLYGON".to_string())
    })?;
    let close = text.rfind(')').ok_or_else(|| {
        Error::GeometryInvalid("WKT polygon missing closing ')'".to_string())
    })?;
    let body = &text[open + 1..close];

    // Exterior ring is the first parenthesized group.
    let ring_start = body.find('(').ok_or_else(|| {
        Error::GeometryInvalid("WKT polygon missing exterior ring".to_string())
    })?;
    let ring_end = body[ring_start..]
        .find(')')
        .map(|i| ring_start + i)
        .ok_or_else(|| Error::GeometryInvalid("WKT exterior ring missing ')'".to_string()))?;
    let ring_text = &body[ring_start + 1..ring_end];

    let mut points = Vec::new();
    for coord in ring_text.split(',') {
        let mut parts = coord.split_whitespace();
        let x: f64 = parts
            .next()
            .ok_or_else(|| Error::GeometryInvalid("WKT coordinate missing x".to_string()))?
            .parse()
            .map_err(|_| Error::GeometryInvalid("WKT coordinate has non-numeric x".to_string()))?;
        let y: f64 = parts
            .next()
            .ok_or_else(|| Error::GeometryInvalid("WKT coordinate missing y".to_string()))?
            .parse()
            .map_err(|_| Error::GeometryInvalid("WKT coordinate has non-numeric y".to_string()))?;
        let z: f64 = parts
            .next()
            .ok_or_else(|| {
                Error::GeometryInvalid("WKT coordinate missing z; POLYGON Z required".to_string())
            })?
            .parse()
            .map_err(|_| Error::GeometryInvalid("WKT coordinate has non-numeric z".to_string()))?;
        points.push([x, y, z]);
    }

    drop_closing_point(points)
}

/// WKB geometry type codes with the Z flag set (ISO/EWKB common convention:
/// base type plus 1000 for Z-only geometries; EWKB instead sets bit 0x80000000).
const WKB_POLYGON_Z: u32 = 1003;
const WKB_POLYGON: u32 = 3;
const WKB_Z_FLAG: u32 = 0x8000_0000;

/// Parse the exterior ring of a WKB `Polygon Z` geometry.
fn parse_wkb_polygon_z(bytes: &[u8]) -> Result<Vec<[f64; 3]>> {
    let mut reader = ByteReader::new(bytes);
    let byte_order = reader.u8()?;
    if byte_order != 1 {
        return Err(Error::GeometryInvalid(
            "only little-endian WKB is supported".to_string(),
        ));
    }

    let geom_type = reader.u32()?;
    let has_z = geom_type == WKB_POLYGON_Z || (geom_type & WKB_Z_FLAG) != 0;
    let base_type = geom_type & !WKB_Z_FLAG;
    if base_type != WKB_POLYGON && geom_type != WKB_POLYGON_Z {
        return Err(Error::GeometryInvalid(format!(
            "expected a WKB polygon geometry, got type {geom_type}"
        )));
    }
    if !has_z {
        return Err(Error::GeometryInvalid(
            "WKB polygon has no Z ordinate".to_string(),
        ));
    }

    let ring_count = reader.u32()?;
    if ring_count == 0 {
        return Err(Error::GeometryInvalid(
            "WKB polygon has no rings".to_string(),
        ));
    }
    let point_count = reader.u32()?;

    let mut points = Vec::with_capacity(point_count as usize);
    for _ in 0..point_count {
        let x = reader.f64()?;
        let y = reader.f64()?;
        let z = reader.f64()?;
        points.push([x, y, z]);
    }

    drop_closing_point(points)
}

fn drop_closing_point(mut points: Vec<[f64; 3]>) -> Result<Vec<[f64; 3]>> {
    if points.len() < 3 {
        return Err(Error::GeometryInvalid(format!(
            "ring has only {} points, need at least 3",
            points.len()
        )));
    }
    if points.len() > 3 && points.first() == points.last() {
        points.pop();
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_shared_vertex_across_triangles() {
        let mut builder = TopologyBuilder::new(false);
        builder
            .add_triangle(
                TriangleSource::Triples([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
                false,
            )
            .unwrap();
        builder
            .add_triangle(
                TriangleSource::Triples([[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]]),
                false,
            )
            .unwrap();

        assert_eq!(builder.vertices().len(), 4);
        assert_eq!(builder.faces().len(), 2);
    }

    #[test]
    fn wkt_polygon_z_parses_exterior_ring() {
        let wkt = "POLYGON Z ((0 0 0, 1 0 10, 0 1 20, 0 0 0))";
        let points = parse_wkt_polygon_z(wkt).unwrap();
        assert_eq!(points, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 10.0], [0.0, 1.0, 20.0]]);
    }

    #[test]
    fn wkt_polygon_without_z_errors() {
        let wkt = "POLYGON ((0 0, 1 0, 0 1, 0 0))";
        assert!(parse_wkt_polygon_z(wkt).is_err());
    }

    #[test]
    fn wkb_polygon_z_round_trips_from_hand_built_bytes() {
        let mut bytes = Vec::new();
        bytes.push(1u8); // little-endian
        bytes.extend_from_slice(&WKB_POLYGON_Z.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes()); // ring count
        bytes.extend_from_slice(&4u32.to_le_bytes()); // point count
        for p in [[0.0f64, 0.0, 0.0], [1.0, 0.0, 5.0], [0.0, 1.0, 5.0], [0.0, 0.0, 0.0]] {
            bytes.extend_from_slice(&p[0].to_le_bytes());
            bytes.extend_from_slice(&p[1].to_le_bytes());
            bytes.extend_from_slice(&p[2].to_le_bytes());
        }

        let points = parse_wkb_polygon_z(&bytes).unwrap();
        assert_eq!(points.len(), 3);
    }

    fn point_set(triangle: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
        let mut t = *triangle;
        t.sort_by(|a, b| a.partial_cmp(b).unwrap());
        t
    }

    #[test]
    fn collapse_four_nodes() {
        let ring = vec![[1.0, 1.0, 1.0], [1.0, 2.0, 1.0], [2.0, 1.0, 1.0], [3.0, 2.0, 2.0]];
        let triangles = collapse_into_triangles(ring);
        assert_eq!(triangles.len(), 2);
        assert_eq!(
            point_set(&triangles[0]),
            point_set(&[[1.0, 1.0, 1.0], [2.0, 1.0, 1.0], [1.0, 2.0, 1.0]])
        );
        assert_eq!(
            point_set(&triangles[1]),
            point_set(&[[1.0, 1.0, 1.0], [2.0, 1.0, 1.0], [3.0, 2.0, 2.0]])
        );
    }

    #[test]
    fn collapse_six_nodes() {
        let ring = vec![
            [1.0, 1.0, 1.0],
            [1.0, 2.0, 1.0],
            [2.0, 1.0, 1.0],
            [3.0, 2.0, 2.0],
            [2.0, 3.0, 3.0],
            [5.0, 2.0, 1.0],
        ];
        let triangles = collapse_into_triangles(ring);
        assert_eq!(triangles.len(), 4);
        assert_eq!(
            point_set(&triangles[0]),
            point_set(&[[1.0, 1.0, 1.0], [2.0, 1.0, 1.0], [1.0, 2.0, 1.0]])
        );
        assert_eq!(
            point_set(&triangles[1]),
            point_set(&[[3.0, 2.0, 2.0], [5.0, 2.0, 1.0], [2.0, 3.0, 3.0]])
        );
        assert_eq!(
            point_set(&triangles[2]),
            point_set(&[[1.0, 1.0, 1.0], [3.0, 2.0, 2.0], [2.0, 1.0, 1.0]])
        );
        assert_eq!(
            point_set(&triangles[3]),
            point_set(&[[1.0, 1.0, 1.0], [3.0, 2.0, 2.0], [5.0, 2.0, 1.0]])
        );
    }

    #[test]
    fn autocorrect_splits_quad_along_shorter_diagonal() {
        let ring = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let triangles = split_ring(ring, true).unwrap();
        assert_eq!(triangles.len(), 2);
    }

    #[test]
    fn quad_without_autocorrect_errors() {
        let ring = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        assert!(split_ring(ring, false).is_err());
    }

    #[test]
    fn pentagon_without_autocorrect_errors() {
        let ring = vec![
            [1.0, 1.0, 1.0],
            [1.0, 2.0, 1.0],
            [2.0, 1.0, 1.0],
            [3.0, 2.0, 2.0],
            [2.0, 3.0, 3.0],
        ];
        assert!(split_ring(ring, false).is_err());
    }

    #[test]
    fn pentagon_with_autocorrect_yields_three_triangles() {
        let ring = vec![
            [1.0, 1.0, 1.0],
            [1.0, 2.0, 1.0],
            [2.0, 1.0, 1.0],
            [3.0, 2.0, 2.0],
            [2.0, 3.0, 3.0],
        ];
        let triangles = split_ring(ring, true).unwrap();
        assert_eq!(triangles.len(), 3);
    }

    #[test]
    fn normals_point_outward_for_flat_upward_triangle() {
        let mut builder = TopologyBuilder::new(true);
        builder
            .add_triangle(
                TriangleSource::Triples([
                    [-122.0, 37.0, 0.0],
                    [-121.9, 37.0, 0.0],
                    [-121.95, 37.1, 0.0],
                ]),
                false,
            )
            .unwrap();
        builder.finish();
        assert_eq!(builder.normals().len(), 3);
        for n in builder.normals() {
            assert!((n.norm() - 1.0).abs() < 1e-9);
        }
    }
}
