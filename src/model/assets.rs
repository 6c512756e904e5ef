use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{EngineError, Result};
use crate::utils::{Mesh, Vertex};

/// Decoded RGBA8 texture
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: color.to_vec(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)?.to_rgba8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            rgba: img.into_raw(),
        })
    }
}

/// Mesh and texture cache keyed by path relative to the asset root.
/// Failed loads are logged once and remembered as absent.
pub struct AssetStore {
    root: PathBuf,
    meshes: HashMap<String, Option<Arc<Mesh>>>,
    textures: HashMap<String, Option<Arc<TextureData>>>,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn insert_mesh(&mut self, key: impl Into<String>, mesh: Mesh) {
        self.meshes.insert(key.into(), Some(Arc::new(mesh)));
    }

    pub fn insert_texture(&mut self, key: impl Into<String>, texture: TextureData) {
        self.textures.insert(key.into(), Some(Arc::new(texture)));
    }

    pub fn mesh(&mut self, key: &str) -> Option<Arc<Mesh>> {
        if let Some(cached) = self.meshes.get(key) {
            return cached.clone();
        }
        let path = self.root.join(key);
        let loaded = match load_obj(&path) {
            Ok(mesh) => {
                debug!(key, verts = mesh.num_verts(), "loaded mesh");
                Some(Arc::new(mesh))
            }
            Err(e) => {
                error!("could not load mesh {}: {}", path.display(), e);
                None
            }
        };
        self.meshes.insert(key.to_string(), loaded.clone());
        loaded
    }

    pub fn texture(&mut self, key: &str) -> Option<Arc<TextureData>> {
        if let Some(cached) = self.textures.get(key) {
            return cached.clone();
        }
        let path = self.root.join(key);
        let loaded = match TextureData::load(&path) {
            Ok(tex) => Some(Arc::new(tex)),
            Err(e) => {
                error!("could not load texture {}: {}", path.display(), e);
                None
            }
        };
        self.textures.insert(key.to_string(), loaded.clone());
        loaded
    }

    /// Lookup without attempting a load
    pub fn cached_texture(&self, key: &str) -> Option<Arc<TextureData>> {
        self.textures.get(key).cloned().flatten()
    }
}

pub fn load_obj(path: &Path) -> Result<Mesh> {
    let src = fs::read_to_string(path)?;
    parse_obj(&src, path)
}

/// Wavefront OBJ reader: `v`, `vn`, `vt` and polygonal `f` records,
/// fan-triangulated. Other records are ignored.
pub fn parse_obj(src: &str, path: &Path) -> Result<Mesh> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    let err = |line: usize, reason: &str| EngineError::MeshParse {
        path: path.to_path_buf(),
        line,
        reason: reason.to_string(),
    };

    for (n, raw) in src.lines().enumerate() {
        let line_no = n + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else { continue };
        let rest: Vec<&str> = parts.collect();

        let floats = |count: usize| -> Result<Vec<f32>> {
            if rest.len() < count {
                return Err(err(line_no, "too few components"));
            }
            rest[..count]
                .iter()
                .map(|s| s.parse::<f32>().map_err(|_| err(line_no, "invalid number")))
                .collect()
        };

        match tag {
            "v" => {
                let v = floats(3)?;
                positions.push(Vec3::new(v[0], v[1], v[2]));
            }
            "vn" => {
                let v = floats(3)?;
                normals.push(Vec3::new(v[0], v[1], v[2]));
            }
            "vt" => {
                let v = floats(2)?;
                tex_coords.push([v[0], v[1]]);
            }
            "f" => {
                if rest.len() < 3 {
                    return Err(err(line_no, "face with fewer than 3 vertices"));
                }
                let mut face = Vec::with_capacity(rest.len());
                for corner in &rest {
                    let mut refs = corner.split('/');
                    let pos = resolve_index(refs.next(), positions.len())
                        .ok_or_else(|| err(line_no, "position index out of range"))?;
                    let uv = resolve_index(refs.next(), tex_coords.len());
                    let normal = resolve_index(refs.next(), normals.len());

                    vertices.push(Vertex::new(
                        positions[pos],
                        normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO),
                        uv.map(|i| tex_coords[i]).unwrap_or([0.0, 0.0]),
                    ));
                    face.push((vertices.len() - 1) as u32);
                }
                for i in 1..face.len() - 1 {
                    indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if vertices.is_empty() {
        return Err(err(0, "no faces found"));
    }
    Ok(Mesh::new(vertices, indices))
}

/// 1-based (or negative, relative) OBJ index to a 0-based one
fn resolve_index(field: Option<&str>, len: usize) -> Option<usize> {
    let field = field.filter(|s| !s.is_empty())?;
    let i: i64 = field.parse().ok()?;
    let idx = if i < 0 { len as i64 + i } else { i - 1 };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

/// JSON intermediate mesh format written by `--convert`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshJson {
    pub num_verts: usize,
    pub points: Vec<f32>,
    pub normals: Vec<f32>,
    pub tex_coords: Vec<f32>,
}

impl From<&Mesh> for MeshJson {
    /// Triangles are unrolled so every three points form one face
    fn from(mesh: &Mesh) -> Self {
        let mut points = Vec::with_capacity(mesh.indices.len() * 3);
        let mut normals = Vec::with_capacity(mesh.indices.len() * 3);
        let mut tex_coords = Vec::with_capacity(mesh.indices.len() * 2);
        for &i in &mesh.indices {
            let v = &mesh.vertices[i as usize];
            points.extend_from_slice(&v.pos);
            normals.extend_from_slice(&v.normal);
            tex_coords.extend_from_slice(&v.uv);
        }
        Self {
            num_verts: mesh.indices.len(),
            points,
            normals,
            tex_coords,
        }
    }
}

pub fn export_mesh_json(mesh_path: &Path, json_path: &Path) -> Result<MeshJson> {
    let mesh = load_obj(mesh_path)?;
    let json = MeshJson::from(&mesh);
    fs::write(json_path, serde_json::to_string(&json)?)?;
    info!(
        "converted {} -> {} ({} verts)",
        mesh_path.display(),
        json_path.display(),
        json.num_verts
    );
    Ok(json)
}
