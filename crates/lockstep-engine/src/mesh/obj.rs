//! Minimal Wavefront OBJ reader.
//!
//! Supports `v`, `vn`, `vt` and `f` with any of the `p`, `p/t`, `p//n` and
//! `p/t/n` corner forms. Polygons are fan-triangulated. Everything else
//! (groups, materials, smoothing) is ignored.

use crate::error::ObjError;

use super::{Mesh, Vertex, VertexDedup};

pub(super) fn parse(src: &str) -> Result<Mesh, ObjError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();

    let mut mesh = Mesh::default();
    let mut dedup = VertexDedup::default();
    let mut has_normals = true;

    for (i, raw) in src.lines().enumerate() {
        let line_no = i + 1;
        let err = |reason: &str| ObjError {
            line: line_no,
            reason: reason.to_string(),
        };

        let line = raw.split('#').next().unwrap_or("").trim();
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };

        match tag {
            "v" => positions.push(floats::<3>(&mut parts).ok_or_else(|| err("bad vertex"))?),
            "vn" => normals.push(floats::<3>(&mut parts).ok_or_else(|| err("bad normal"))?),
            "vt" => {
                let [u, v] = floats::<2>(&mut parts).ok_or_else(|| err("bad texcoord"))?;
                uvs.push([u, 1.0 - v]);
            }
            "f" => {
                let mut corners = Vec::with_capacity(4);
                for corner in parts {
                    let key = corner_key(corner, positions.len(), uvs.len(), normals.len())
                        .ok_or_else(|| err("bad face index"))?;
                    has_normals &= key.2.is_some();
                    let index = dedup.index(key, &mut mesh.vertices, || Vertex {
                        position: positions[key.0],
                        normal: key.2.map_or([0.0; 3], |n| normals[n]),
                        uv: key.1.map_or([0.0; 2], |t| uvs[t]),
                    });
                    corners.push(index);
                }
                if corners.len() < 3 {
                    return Err(err("face needs at least 3 corners"));
                }
                for k in 1..corners.len() - 1 {
                    mesh.indices
                        .extend_from_slice(&[corners[0], corners[k], corners[k + 1]]);
                }
            }
            _ => {}
        }
    }

    if !has_normals || normals.is_empty() {
        mesh.compute_normals();
    }
    Ok(mesh)
}

fn floats<const N: usize>(parts: &mut std::str::SplitWhitespace<'_>) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    for slot in &mut out {
        *slot = parts.next()?.parse().ok()?;
    }
    Some(out)
}

fn corner_key(
    corner: &str,
    n_pos: usize,
    n_uv: usize,
    n_norm: usize,
) -> Option<(usize, Option<usize>, Option<usize>)> {
    let mut fields = corner.split('/');
    let p = resolve(fields.next()?, n_pos)?;
    let t = match fields.next() {
        None | Some("") => None,
        Some(s) => Some(resolve(s, n_uv)?),
    };
    let n = match fields.next() {
        None | Some("") => None,
        Some(s) => Some(resolve(s, n_norm)?),
    };
    Some((p, t, n))
}

/// OBJ indices are 1-based; negative values count back from the end.
fn resolve(field: &str, len: usize) -> Option<usize> {
    let idx: i64 = field.parse().ok()?;
    let resolved = if idx > 0 {
        idx - 1
    } else if idx < 0 {
        len as i64 + idx
    } else {
        return None;
    };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# unit quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn quad_is_fan_triangulated() {
        let mesh = parse(QUAD).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.vertices[0].normal, [0.0, 0.0, 1.0]);
        // v is flipped to top-left origin.
        assert_eq!(mesh.vertices[0].uv, [0.0, 1.0]);
    }

    #[test]
    fn shared_corners_are_deduplicated() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\nf 1 2 3\nf 2 4 3\n";
        let mesh = parse(src).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn missing_normals_are_computed() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        for v in &mesh.vertices {
            assert!((v.normal[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn negative_indices_count_from_end() {
        let mesh = parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn out_of_range_index_reports_line() {
        let err = parse("v 0 0 0\n\nf 1 2 3\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn degenerate_face_is_rejected() {
        assert!(parse("v 0 0 0\nv 1 0 0\nf 1 2\n").is_err());
    }

    #[test]
    fn unknown_statements_are_ignored() {
        let src = "o bunny\nmtllib x.mtl\nusemtl y\ns 1\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert_eq!(parse(src).unwrap().indices.len(), 3);
    }
}
