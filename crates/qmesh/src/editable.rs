//! Mutable wrapper around a decoded [`TerrainTile`]: height edits, normal
//! overrides, and triangle splitting, with deferred requantization and a
//! compact-before-save rebuild.
//!
//! Grounded on the general mutate-then-recompute-derived-state shape the
//! teacher's `hypc::write_file` already follows (it recomputes its flags
//! byte from the tile's current contents on every save rather than trusting
//! stale state); the two-phase rebuild itself has no HYPC analogue and is
//! built directly from this format's height-requantization and
//! index-compaction rules.

use crate::error::{Error, Result};
use crate::geodesy::{lerp, Vec3};
use crate::tile::{GeographicBounds, TerrainTile, MAX};

/// The four tile edges, keyed the way [`TerrainTile`]'s edge-index lists are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    West,
    South,
    East,
    North,
}

/// A loaded tile plus the bookkeeping needed to edit it safely: a deferred
/// true-height side table (used once an edit pushes a height outside the
/// tile's current `[minHeight, maxHeight]`) and a dirty flag that gates
/// index compaction before the next save.
pub struct EditableTile {
    pub tile: TerrainTile,
    index_dirty: bool,
    changed_heights: Vec<f64>,
}

impl EditableTile {
    pub fn new(tile: TerrainTile) -> Self {
        EditableTile {
            tile,
            index_dirty: false,
            changed_heights: Vec::new(),
        }
    }

    pub fn bounds(&self) -> GeographicBounds {
        self.tile.bounds
    }

    /// True once an edit (normal override or triangle split) requires a
    /// vertex-array compaction before the next save.
    pub fn is_index_dirty(&self) -> bool {
        self.index_dirty
    }

    /// True once a height edit has pushed a value outside the tile's
    /// current range and a `rebuild_h` is owed before the next save.
    pub fn has_deferred_heights(&self) -> bool {
        !self.changed_heights.is_empty()
    }

    pub fn get_height(&self, index: usize) -> f64 {
        dequantize_height(
            self.tile.h[index],
            self.tile.header.min_height,
            self.tile.header.max_height,
        )
    }

    /// Set vertex `index`'s height. If it still fits the tile's current
    /// `[minHeight, maxHeight]` and no deferred edit is already pending, the
    /// quantized `h` value is updated directly; otherwise the true height is
    /// recorded in the deferred side table, to be folded into a new range by
    /// the next [`Self::rebuild_h`].
    pub fn set_height(&mut self, index: usize, height_meters: f64) {
        let min = self.tile.header.min_height as f64;
        let max = self.tile.header.max_height as f64;
        let height_is_dirty = height_meters < min || max < height_meters;

        if height_is_dirty || !self.changed_heights.is_empty() {
            self.ensure_deferred_heights_initialized();
            self.changed_heights[index] = height_meters;
        } else {
            self.tile.h[index] = quantize_height(height_meters, min, max);
        }
    }

    fn ensure_deferred_heights_initialized(&mut self) {
        if self.changed_heights.is_empty() {
            let min = self.tile.header.min_height;
            let max = self.tile.header.max_height;
            self.changed_heights = self
                .tile
                .h
                .iter()
                .map(|&h| dequantize_height(h, min, max))
                .collect();
        }
    }

    /// Longitude, latitude, and true height of vertex `index`.
    pub fn get_llh(&self, index: usize) -> (f64, f64, f64) {
        let b = self.tile.bounds;
        let lon = lerp_scalar(b.west, b.east, self.tile.u[index] as f64 / MAX as f64);
        let lat = lerp_scalar(b.south, b.north, self.tile.v[index] as f64 / MAX as f64);
        let height = self.get_height(index);
        (lon, lat, height)
    }

    pub fn set_normal(&mut self, index: usize, normal: Vec3) {
        self.tile.v_light[index] = normal;
        self.index_dirty = true;
    }

    /// Indices of every vertex lying on `edge`, in ascending storage order.
    pub fn get_edge_vertices(&self, edge: Edge) -> Vec<u32> {
        match edge {
            Edge::West => self.tile.west_i.clone(),
            Edge::South => self.tile.south_i.clone(),
            Edge::East => self.tile.east_i.clone(),
            Edge::North => self.tile.north_i.clone(),
        }
    }

    pub fn get_edge_coordinates(&self, edge: Edge) -> Vec<(f64, f64, f64)> {
        self.get_edge_vertices(edge)
            .into_iter()
            .map(|i| self.get_llh(i as usize))
            .collect()
    }

    /// The first triangle (as an index into `indices`, in triangles not
    /// scalars) whose three vertices include both `v_prev` and `v_next`.
    pub fn find_triangle_with_edge(&self, v_prev: u32, v_next: u32) -> Option<usize> {
        self.tile
            .indices
            .chunks_exact(3)
            .position(|t| t.contains(&v_prev) && t.contains(&v_next))
    }

    /// Insert a new vertex at `(lon, lat, height)`, replacing `v_next` with it
    /// in the triangle at `tri_index` and adding a second triangle that
    /// replaces `v_prev` with it instead. Returns the new vertex's index.
    pub fn split_triangle(
        &mut self,
        tri_index: usize,
        v_prev: u32,
        v_next: u32,
        vertex_insert: (f64, f64, f64),
    ) -> Result<u32> {
        let offset = tri_index * 3;
        if offset + 3 > self.tile.indices.len() {
            return Err(Error::InvariantViolation(format!(
                "triangle index {tri_index} out of range"
            )));
        }
        let old_triangle = [
            self.tile.indices[offset],
            self.tile.indices[offset + 1],
            self.tile.indices[offset + 2],
        ];

        let (lon, lat, height) = vertex_insert;
        let b = self.tile.bounds;
        let u = quantize_scalar(lon, b.west, b.east);
        let v = quantize_scalar(lat, b.south, b.north);
        self.tile.u.push(u);
        self.tile.v.push(v);
        let vertex_new_index = (self.tile.u.len() - 1) as u32;

        let min = self.tile.header.min_height as f64;
        let max = self.tile.header.max_height as f64;
        let h = if min < height && height < max {
            if !self.changed_heights.is_empty() {
                self.changed_heights.push(height);
            }
            quantize_height(height, min, max)
        } else {
            self.ensure_deferred_heights_initialized();
            self.changed_heights.push(height);
            0
        };
        self.tile.h.push(h);

        if !self.tile.v_light.is_empty() {
            self.tile.v_light.push(Vec3::ZERO);
        }

        let mut new_triangle = old_triangle;
        let vertex_offset = old_triangle
            .iter()
            .position(|&v| v == v_next)
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "vertex {v_next} not part of triangle {tri_index}"
                ))
            })?;
        new_triangle[vertex_offset] = vertex_new_index;

        let prev_offset = old_triangle
            .iter()
            .position(|&v| v == v_prev)
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "vertex {v_prev} not part of triangle {tri_index}"
                ))
            })?;
        let mut prev_triangle = old_triangle;
        prev_triangle[prev_offset] = vertex_new_index;

        self.tile.indices[offset + vertex_offset] = vertex_new_index;
        self.tile.indices.extend_from_slice(&prev_triangle);

        self.index_dirty = true;
        Ok(vertex_new_index)
    }

    /// Fold the deferred true-height side table into a new `[min, max]`
    /// range, requantizing every height and clamping to `[0, MAX]`. No-op if
    /// no heights are deferred.
    pub fn rebuild_h(&mut self) {
        if self.changed_heights.is_empty() {
            return;
        }

        let new_max = self
            .changed_heights
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let new_min = self
            .changed_heights
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min);

        for (i, &height) in self.changed_heights.iter().enumerate() {
            self.tile.h[i] = quantize_height(height, new_min, new_max);
        }

        self.tile.header.min_height = new_min as f32;
        self.tile.header.max_height = new_max as f32;
        self.changed_heights.clear();
    }

    /// Compact the vertex arrays by walking the index stream and emitting
    /// each referenced old vertex exactly once, in first-seen order;
    /// rewrite `indices` accordingly and regenerate the four edge-index
    /// lists from the compacted `u`/`v`. No-op if nothing is dirty.
    ///
    /// The deferred height side table, if any, is carried through the same
    /// permutation so it stays aligned with the compacted `h` array for the
    /// `rebuild_h` that follows.
    pub fn rebuild_indices(&mut self) -> Result<()> {
        if !self.index_dirty {
            return Ok(());
        }

        let old_len = self.tile.indices.len();
        let mut new_u = Vec::new();
        let mut new_v = Vec::new();
        let mut new_h = Vec::new();
        let keep_normals = !self.tile.v_light.is_empty();
        let mut new_v_light = Vec::new();
        let keep_deferred_heights = !self.changed_heights.is_empty();
        let mut new_changed_heights = Vec::new();
        let mut index_map = std::collections::HashMap::new();
        let mut new_indices = Vec::with_capacity(old_len);

        for &old_i in &self.tile.indices {
            let new_i = *index_map.entry(old_i).or_insert_with(|| {
                new_u.push(self.tile.u[old_i as usize]);
                new_v.push(self.tile.v[old_i as usize]);
                new_h.push(self.tile.h[old_i as usize]);
                if keep_normals {
                    new_v_light.push(self.tile.v_light[old_i as usize]);
                }
                if keep_deferred_heights {
                    new_changed_heights.push(self.changed_heights[old_i as usize]);
                }
                (new_u.len() - 1) as u32
            });
            new_indices.push(new_i);
        }

        if new_indices.len() != old_len {
            return Err(Error::InvariantViolation(
                "rebuilt index array length changed".to_string(),
            ));
        }

        self.tile.indices = new_indices;
        self.tile.u = new_u;
        self.tile.v = new_v;
        self.tile.h = new_h;
        self.tile.v_light = new_v_light;
        if keep_deferred_heights {
            self.changed_heights = new_changed_heights;
        }

        self.tile.west_i = self.get_edge_vertices(Edge::West);
        self.tile.south_i = self.get_edge_vertices(Edge::South);
        self.tile.east_i = self.get_edge_vertices(Edge::East);
        self.tile.north_i = self.get_edge_vertices(Edge::North);

        self.index_dirty = false;
        Ok(())
    }

    /// Rebuild whatever is pending (index compaction, then deferred
    /// heights) and encode to the wire format.
    pub fn to_file(&mut self) -> Result<Vec<u8>> {
        self.rebuild_indices()?;
        self.rebuild_h();
        self.tile.encode()
    }
}

fn lerp_scalar(lo: f64, hi: f64, t: f64) -> f64 {
    lo * (1.0 - t) + hi * t
}

fn quantize_scalar(value: f64, lo: f64, hi: f64) -> u16 {
    (((value - lo) / (hi - lo)) * MAX as f64).round() as u16
}

fn quantize_height(height: f64, min: f64, max: f64) -> u16 {
    let range = max - min;
    if range == 0.0 {
        return 0;
    }
    (((height - min) / range) * MAX as f64).round().clamp(0.0, MAX as f64) as u16
}

fn dequantize_height(h: u16, min: f32, max: f32) -> f64 {
    lerp_scalar(min as f64, max as f64, h as f64 / MAX as f64)
}
