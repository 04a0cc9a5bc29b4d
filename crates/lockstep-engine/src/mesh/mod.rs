//! Mesh-mode geometry.
//!
//! Vertices are interleaved `position | normal | uv` (32 bytes), indices are
//! `u32` triangle lists. The default model is a UV sphere; OBJ files can be
//! loaded from disk or through the hash-verified [`AssetCache`].

mod asset;
mod obj;

pub use asset::{AssetCache, CachedAsset, Fetcher, HttpFetcher, sha256_hex};

use std::collections::HashMap;
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::config::MeshSource;
use crate::error::ObjError;

/// Segments used for the default sphere.
pub const DEFAULT_SPHERE_SEGMENTS: u32 = 32;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Sphere of radius 0.5 (unit extent) centered on the origin.
    pub fn uv_sphere(segments: u32) -> Self {
        let segments = segments.max(3);
        let rings = segments;
        let radius = 0.5;

        let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
        for r in 0..=rings {
            let v = r as f32 / rings as f32;
            let phi = v * std::f32::consts::PI;
            for s in 0..=segments {
                let u = s as f32 / segments as f32;
                let theta = u * std::f32::consts::TAU;
                let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                vertices.push(Vertex {
                    position: (n * radius).to_array(),
                    normal: n.to_array(),
                    uv: [u, v],
                });
            }
        }

        let row = segments + 1;
        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
        for r in 0..rings {
            for s in 0..segments {
                let a = r * row + s;
                let b = a + row;
                // Counter-clockwise seen from outside.
                indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }

        Self { vertices, indices }
    }

    /// Parses a Wavefront OBJ document (`v`, `vn`, `vt`, `f`).
    pub fn from_obj_str(src: &str) -> Result<Self, ObjError> {
        obj::parse(src)
    }

    /// Centers the mesh on the origin and scales its largest side to 1.
    pub fn normalize(&mut self) {
        let Some(first) = self.vertices.first() else {
            return;
        };
        let mut min = Vec3::from_array(first.position);
        let mut max = min;
        for v in &self.vertices {
            let p = Vec3::from_array(v.position);
            min = min.min(p);
            max = max.max(p);
        }

        let center = (min + max) * 0.5;
        let extent = (max - min).max_element();
        let scale = if extent > f32::EPSILON { 1.0 / extent } else { 1.0 };
        for v in &mut self.vertices {
            v.position = ((Vec3::from_array(v.position) - center) * scale).to_array();
        }
    }

    /// Fills in smooth normals from face geometry.
    pub(crate) fn compute_normals(&mut self) {
        let mut acc = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let pa = Vec3::from_array(self.vertices[a].position);
            let pb = Vec3::from_array(self.vertices[b].position);
            let pc = Vec3::from_array(self.vertices[c].position);
            let n = (pb - pa).cross(pc - pa);
            acc[a] += n;
            acc[b] += n;
            acc[c] += n;
        }
        for (v, n) in self.vertices.iter_mut().zip(acc) {
            v.normal = n.normalize_or(Vec3::Y).to_array();
        }
    }
}

/// Builds the mesh for `source`.
///
/// Any failure is logged and replaced by the default sphere; mesh content is
/// never fatal.
pub fn load_mesh(source: &MeshSource, cache: &AssetCache) -> Mesh {
    let loaded = match source {
        MeshSource::Sphere => return Mesh::uv_sphere(DEFAULT_SPHERE_SEGMENTS),
        MeshSource::File(path) => read_obj(path),
        MeshSource::Cached {
            url,
            sha256,
            cache_path,
        } => {
            let asset = CachedAsset {
                url: url.clone(),
                sha256: sha256.clone(),
                path: cache_path.clone(),
            };
            cache
                .ensure(&asset)
                .map_err(anyhow::Error::from)
                .and_then(|path| read_obj(&path))
        }
    };

    match loaded {
        Ok(mut mesh) => {
            mesh.normalize();
            log::info!(
                "mesh: {} vertices, {} triangles",
                mesh.vertices.len(),
                mesh.indices.len() / 3
            );
            mesh
        }
        Err(e) => {
            log::warn!("mesh unavailable ({e:#}); using sphere");
            Mesh::uv_sphere(DEFAULT_SPHERE_SEGMENTS)
        }
    }
}

fn read_obj(path: &Path) -> anyhow::Result<Mesh> {
    use anyhow::Context as _;

    let src = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mesh = Mesh::from_obj_str(&src).with_context(|| format!("failed to parse {}", path.display()))?;
    anyhow::ensure!(!mesh.indices.is_empty(), "{} has no faces", path.display());
    Ok(mesh)
}

/// Deduplicates `(position, uv, normal)` index triples into vertices.
#[derive(Default)]
pub(crate) struct VertexDedup {
    map: HashMap<(usize, Option<usize>, Option<usize>), u32>,
}

impl VertexDedup {
    pub(crate) fn index(
        &mut self,
        key: (usize, Option<usize>, Option<usize>),
        vertices: &mut Vec<Vertex>,
        make: impl FnOnce() -> Vertex,
    ) -> u32 {
        *self.map.entry(key).or_insert_with(|| {
            vertices.push(make());
            (vertices.len() - 1) as u32
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_stride_is_32_bytes() {
        assert_eq!(Vertex::STRIDE, 32);
    }

    #[test]
    fn sphere_has_unit_extent_and_valid_indices() {
        let mesh = Mesh::uv_sphere(16);
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        for v in &mesh.vertices {
            let r = Vec3::from_array(v.position).length();
            assert!((r - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn sphere_segments_are_clamped() {
        let mesh = Mesh::uv_sphere(0);
        assert!(!mesh.indices.is_empty());
    }

    #[test]
    fn normalize_centers_and_scales() {
        let mut mesh = Mesh {
            vertices: vec![
                Vertex { position: [10.0, 0.0, 0.0], normal: [0.0; 3], uv: [0.0; 2] },
                Vertex { position: [14.0, 2.0, 1.0], normal: [0.0; 3], uv: [0.0; 2] },
            ],
            indices: vec![],
        };
        mesh.normalize();
        assert_eq!(mesh.vertices[0].position, [-0.5, -0.25, -0.125]);
        assert_eq!(mesh.vertices[1].position, [0.5, 0.25, 0.125]);
    }

    #[test]
    fn normalize_empty_mesh_is_noop() {
        let mut mesh = Mesh::default();
        mesh.normalize();
        assert!(mesh.vertices.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_sphere() {
        let cache = AssetCache::offline();
        let mesh = load_mesh(
            &MeshSource::File("/nonexistent/lockstep/model.obj".into()),
            &cache,
        );
        assert_eq!(mesh, Mesh::uv_sphere(DEFAULT_SPHERE_SEGMENTS));
    }
}
