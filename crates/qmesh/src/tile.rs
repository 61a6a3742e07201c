//! The quantized-mesh tile entity: in-memory model plus its binary codec.
//!
//! Grounded on the teacher's `parse_hypc_bytes`/`write_file` pair in the
//! `hypc` crate: a single `&[u8]` parsing entry point that is "the single
//! source of truth for parsing", paired with a writer that recomputes its
//! own flags/lengths from the struct rather than trusting stale state.
//! Generalized from HYPC's one fixed-shape record to this format's flags-
//! free, vertex-count-driven section sizes and two numbered extension
//! blocks.

use std::io::Write;

use crate::binary::{
    decode_indices, delta_decode, delta_encode, encode_indices, oct_decode, oct_encode, write_f32,
    write_f64, write_u16, write_u32, write_u8, ByteReader,
};
use crate::bounds::{bounding_sphere, horizon_occlusion_point};
use crate::error::{Error, Result};
use crate::geodesy::Vec3;
use crate::topology::TopologyBuilder;

/// Vertex coordinates are quantized to `[0, MAX]`.
pub const MAX: u16 = 32767;

const EXT_OCT_NORMALS: u8 = 1;
const EXT_WATERMASK: u8 = 2;
const WATERMASK_GRID_LEN: usize = 65536;

/// A geographic rectangle in degrees. Not part of the wire format — every
/// tile operation that needs it takes it as an explicit parameter, since
/// deriving it from zoom/x/y tile coordinates is an external collaborator's
/// job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographicBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeographicBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self> {
        if !(west < east && south < north) {
            return Err(Error::GeometryInvalid(format!(
                "bounds must satisfy west < east and south < north, got w={west} s={south} e={east} n={north}"
            )));
        }
        Ok(GeographicBounds { west, south, east, north })
    }
}

/// The 12-scalar tile header: ECEF center, height extent, bounding sphere,
/// horizon occlusion point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileHeader {
    pub center: Vec3,
    pub min_height: f32,
    pub max_height: f32,
    pub sphere_center: Vec3,
    pub sphere_radius: f64,
    pub horizon_point: Vec3,
}

/// The watermask extension: absent, one uniform byte, or a 256x256 grid
/// (rows north to south, columns west to east).
#[derive(Debug, Clone)]
pub enum Watermask {
    None,
    Uniform(u8),
    Grid(Box<[u8; WATERMASK_GRID_LEN]>),
}

impl Watermask {
    fn wire_length(&self) -> Option<u32> {
        match self {
            Watermask::None => None,
            Watermask::Uniform(_) => Some(1),
            Watermask::Grid(_) => Some(WATERMASK_GRID_LEN as u32),
        }
    }
}

/// A loaded or assembled quantized-mesh tile.
#[derive(Debug, Clone)]
pub struct TerrainTile {
    pub bounds: GeographicBounds,
    pub header: TileHeader,
    pub u: Vec<u16>,
    pub v: Vec<u16>,
    pub h: Vec<u16>,
    pub indices: Vec<u32>,
    pub west_i: Vec<u32>,
    pub south_i: Vec<u32>,
    pub east_i: Vec<u32>,
    pub north_i: Vec<u32>,
    pub v_light: Vec<Vec3>,
    pub watermask: Watermask,
}

fn idx_is_wide(vertex_count: usize) -> bool {
    vertex_count > 65536
}

impl TerrainTile {
    /// Iterate triangles as index triples, without materializing an owned
    /// `Vec`.
    pub fn triangles(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|c| (c[0], c[1], c[2]))
    }

    pub fn vertex_count(&self) -> usize {
        self.u.len()
    }

    /// Decode a tile from its wire bytes. `bounds` is supplied by the
    /// caller since it is not carried in the wire format.
    pub fn decode(bytes: &[u8], bounds: GeographicBounds) -> Result<Self> {
        let mut r = ByteReader::new(bytes);

        let center = Vec3::new(r.f64()?, r.f64()?, r.f64()?);
        let min_height = r.f32()?;
        let max_height = r.f32()?;
        let sphere_center = Vec3::new(r.f64()?, r.f64()?, r.f64()?);
        let sphere_radius = r.f64()?;
        let horizon_point = Vec3::new(r.f64()?, r.f64()?, r.f64()?);

        let header = TileHeader {
            center,
            min_height,
            max_height,
            sphere_center,
            sphere_radius,
            horizon_point,
        };

        let vertex_count = r.u32()? as usize;
        let wide = idx_is_wide(vertex_count);

        let u = delta_decode(&read_u16_array(&mut r, vertex_count)?);
        let v = delta_decode(&read_u16_array(&mut r, vertex_count)?);
        let h = delta_decode(&read_u16_array(&mut r, vertex_count)?);

        let triangle_count = r.u32()? as usize;
        let index_codes = read_idx_array(&mut r, triangle_count * 3, wide)?;
        let indices = decode_indices(&index_codes);
        for &i in &indices {
            if i as usize >= vertex_count {
                return Err(Error::MalformedInput(format!(
                    "index {i} out of range for {vertex_count} vertices"
                )));
            }
        }

        let west_i = read_edge_list(&mut r, wide)?;
        let south_i = read_edge_list(&mut r, wide)?;
        let east_i = read_edge_list(&mut r, wide)?;
        let north_i = read_edge_list(&mut r, wide)?;

        let mut v_light = Vec::new();
        let mut watermask = Watermask::None;

        while !r.is_empty() {
            let id = r.u8()?;
            let length = r.u32()?;
            match id {
                EXT_OCT_NORMALS => {
                    let _padding = r.bytes(2)?;
                    v_light = Vec::with_capacity(vertex_count);
                    for _ in 0..vertex_count {
                        let x = r.u8()?;
                        let y = r.u8()?;
                        v_light.push(oct_decode(x, y));
                    }
                }
                EXT_WATERMASK => {
                    watermask = match length {
                        1 => Watermask::Uniform(r.u8()?),
                        65536 => {
                            let bytes = r.bytes(65536)?;
                            let mut grid = Box::new([0u8; WATERMASK_GRID_LEN]);
                            grid.copy_from_slice(bytes);
                            Watermask::Grid(grid)
                        }
                        other => {
                            return Err(Error::MalformedInput(format!(
                                "watermask length must be 1 or 65536, got {other}"
                            )))
                        }
                    };
                }
                other => {
                    return Err(Error::MalformedInput(format!(
                        "unknown extension id {other}"
                    )))
                }
            }
        }

        Ok(TerrainTile {
            bounds,
            header,
            u,
            v,
            h,
            indices,
            west_i,
            south_i,
            east_i,
            north_i,
            v_light,
            watermask,
        })
    }

    /// Encode this tile to its wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.encode_to(&mut out)?;
        Ok(out)
    }

    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_f64(w, self.header.center.x)?;
        write_f64(w, self.header.center.y)?;
        write_f64(w, self.header.center.z)?;
        write_f32(w, self.header.min_height)?;
        write_f32(w, self.header.max_height)?;
        write_f64(w, self.header.sphere_center.x)?;
        write_f64(w, self.header.sphere_center.y)?;
        write_f64(w, self.header.sphere_center.z)?;
        write_f64(w, self.header.sphere_radius)?;
        write_f64(w, self.header.horizon_point.x)?;
        write_f64(w, self.header.horizon_point.y)?;
        write_f64(w, self.header.horizon_point.z)?;

        let vertex_count = self.vertex_count();
        let wide = idx_is_wide(vertex_count);

        write_u32(w, vertex_count as u32)?;
        write_u16_array(w, &delta_encode(&self.u))?;
        write_u16_array(w, &delta_encode(&self.v))?;
        write_u16_array(w, &delta_encode(&self.h))?;

        write_u32(w, (self.indices.len() / 3) as u32)?;
        write_idx_array(w, &encode_indices(&self.indices), wide)?;

        write_edge_list(w, &self.west_i, wide)?;
        write_edge_list(w, &self.south_i, wide)?;
        write_edge_list(w, &self.east_i, wide)?;
        write_edge_list(w, &self.north_i, wide)?;

        if !self.v_light.is_empty() {
            write_u8(w, EXT_OCT_NORMALS)?;
            write_u32(w, 2 + 2 * vertex_count as u32)?;
            write_u8(w, 0)?;
            write_u8(w, 0)?;
            for n in &self.v_light {
                let (x, y) = oct_encode(*n)?;
                write_u8(w, x)?;
                write_u8(w, y)?;
            }
        }

        if let Some(length) = self.watermask.wire_length() {
            write_u8(w, EXT_WATERMASK)?;
            write_u32(w, length)?;
            match &self.watermask {
                Watermask::None => unreachable!(),
                Watermask::Uniform(byte) => write_u8(w, *byte)?,
                Watermask::Grid(grid) => w.write_all(grid.as_ref())?,
            }
        }

        Ok(())
    }

    /// Derive a tile from an assembled [`TopologyBuilder`]: center of the
    /// ECEF AABB, bounding sphere, horizon occlusion point, quantized
    /// vertex streams, and edge-index lists populated by comparing each
    /// vertex's original longitude/latitude against the supplied bounds.
    ///
    /// Call [`TopologyBuilder::finish`] before this if normals are wanted;
    /// this takes the builder by shared reference and cannot call it for
    /// the caller.
    pub fn from_topology(
        topology: &TopologyBuilder,
        bounds: GeographicBounds,
        watermask: Watermask,
    ) -> Result<Self> {
        let verts = topology.vertices();
        if verts.is_empty() {
            return Err(Error::EmptyBoundingInput(0));
        }

        let ecef_points: Vec<Vec3> = verts.iter().map(|v| v.ecef).collect();

        let mut min = ecef_points[0];
        let mut max = ecef_points[0];
        for &p in &ecef_points {
            min = Vec3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
            max = Vec3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
        }
        let center = Vec3::new(
            (min.x + max.x) * 0.5,
            (min.y + max.y) * 0.5,
            (min.z + max.z) * 0.5,
        );

        let sphere = bounding_sphere(&ecef_points)?;
        let horizon_point = horizon_occlusion_point(&ecef_points, &sphere)?;

        let mut min_height = f32::INFINITY;
        let mut max_height = f32::NEG_INFINITY;
        for v in verts {
            min_height = min_height.min(v.height as f32);
            max_height = max_height.max(v.height as f32);
        }

        let header = TileHeader {
            center,
            min_height,
            max_height,
            sphere_center: sphere.center,
            sphere_radius: sphere.radius,
            horizon_point,
        };

        let height_range = (max_height - min_height) as f64;
        let mut u = Vec::with_capacity(verts.len());
        let mut v = Vec::with_capacity(verts.len());
        let mut h = Vec::with_capacity(verts.len());
        let mut west_i = Vec::new();
        let mut south_i = Vec::new();
        let mut east_i = Vec::new();
        let mut north_i = Vec::new();

        for (i, vert) in verts.iter().enumerate() {
            let qu = quantize(vert.lon, bounds.west, bounds.east);
            let qv = quantize(vert.lat, bounds.south, bounds.north);
            let qh = if height_range == 0.0 {
                0
            } else {
                quantize_range(vert.height as f32, min_height, max_height)
            };
            u.push(qu);
            v.push(qv);
            h.push(qh);

            if vert.lon == bounds.west {
                west_i.push(i as u32);
            }
            if vert.lon == bounds.east {
                east_i.push(i as u32);
            }
            if vert.lat == bounds.south {
                south_i.push(i as u32);
            }
            if vert.lat == bounds.north {
                north_i.push(i as u32);
            }
        }

        let indices: Vec<u32> = topology.faces().iter().flatten().copied().collect();
        let v_light = topology.normals().to_vec();

        Ok(TerrainTile {
            bounds,
            header,
            u,
            v,
            h,
            indices,
            west_i,
            south_i,
            east_i,
            north_i,
            v_light,
            watermask,
        })
    }
}

fn quantize(value: f64, lo: f64, hi: f64) -> u16 {
    (((value - lo) / (hi - lo)) * MAX as f64).round() as u16
}

fn quantize_range(value: f32, lo: f32, hi: f32) -> u16 {
    (((value - lo) / (hi - lo)) * MAX as f32).round() as u16
}

fn read_u16_array(r: &mut ByteReader<'_>, count: usize) -> Result<Vec<u16>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(r.u16()?);
    }
    Ok(out)
}

fn write_u16_array<W: Write>(w: &mut W, values: &[u16]) -> Result<()> {
    for &v in values {
        write_u16(w, v)?;
    }
    Ok(())
}

fn read_idx_array(r: &mut ByteReader<'_>, count: usize, wide: bool) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(if wide { r.u32()? } else { r.u16()? as u32 });
    }
    Ok(out)
}

fn write_idx_array<W: Write>(w: &mut W, values: &[u32], wide: bool) -> Result<()> {
    for &v in values {
        if wide {
            write_u32(w, v)?;
        } else {
            write_u16(w, v as u16)?;
        }
    }
    Ok(())
}

fn read_edge_list(r: &mut ByteReader<'_>, wide: bool) -> Result<Vec<u32>> {
    let count = r.u32()? as usize;
    read_idx_array(r, count, wide)
}

fn write_edge_list<W: Write>(w: &mut W, values: &[u32], wide: bool) -> Result<()> {
    write_u32(w, values.len() as u32)?;
    write_idx_array(w, values, wide)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{TopologyBuilder, TriangleSource};

    fn sample_tile() -> TerrainTile {
        let bounds = GeographicBounds::new(-10.0, -10.0, 10.0, 10.0).unwrap();
        let mut topology = TopologyBuilder::new(true);
        topology
            .add_triangle(
                TriangleSource::Triples([[-10.0, -10.0, 0.0], [10.0, -10.0, 5.0], [-10.0, 10.0, 10.0]]),
                false,
            )
            .unwrap();
        topology
            .add_triangle(
                TriangleSource::Triples([[10.0, -10.0, 5.0], [10.0, 10.0, 2.0], [-10.0, 10.0, 10.0]]),
                false,
            )
            .unwrap();
        topology.finish();

        TerrainTile::from_topology(&topology, bounds, Watermask::None).unwrap()
    }

    #[test]
    fn decode_of_encode_round_trips_bitwise() {
        let tile = sample_tile();
        let bytes = tile.encode().unwrap();
        let decoded = TerrainTile::decode(&bytes, tile.bounds).unwrap();

        assert_eq!(decoded.u, tile.u);
        assert_eq!(decoded.v, tile.v);
        assert_eq!(decoded.h, tile.h);
        assert_eq!(decoded.indices, tile.indices);
        assert_eq!(decoded.west_i, tile.west_i);
        assert_eq!(decoded.south_i, tile.south_i);
        assert_eq!(decoded.east_i, tile.east_i);
        assert_eq!(decoded.north_i, tile.north_i);
    }

    #[test]
    fn edge_vertices_have_extremal_u_or_v() {
        let tile = sample_tile();
        for &i in &tile.west_i {
            assert_eq!(tile.u[i as usize], 0);
        }
        for &i in &tile.east_i {
            assert_eq!(tile.u[i as usize], MAX);
        }
        for &i in &tile.south_i {
            assert_eq!(tile.v[i as usize], 0);
        }
        for &i in &tile.north_i {
            assert_eq!(tile.v[i as usize], MAX);
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let tile = sample_tile();
        let mut bytes = tile.encode().unwrap();
        bytes.push(0xFF);
        let err = TerrainTile::decode(&bytes, tile.bounds).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn unknown_extension_id_is_rejected() {
        let tile = sample_tile();
        let mut bytes = tile.encode().unwrap();
        bytes.push(99);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let err = TerrainTile::decode(&bytes, tile.bounds).unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn watermask_uniform_round_trips() {
        let bounds = GeographicBounds::new(-10.0, -10.0, 10.0, 10.0).unwrap();
        let mut topology = TopologyBuilder::new(false);
        topology
            .add_triangle(
                TriangleSource::Triples([[-10.0, -10.0, 0.0], [10.0, -10.0, 5.0], [-10.0, 10.0, 10.0]]),
                false,
            )
            .unwrap();
        let tile = TerrainTile::from_topology(&topology, bounds, Watermask::Uniform(255)).unwrap();

        let bytes = tile.encode().unwrap();
        let decoded = TerrainTile::decode(&bytes, bounds).unwrap();
        assert!(matches!(decoded.watermask, Watermask::Uniform(255)));
    }
}
