use std::sync::atomic::{AtomicU64, Ordering};

use bytemuck::{NoUninit, Pod, Zeroable};
use glam::Vec3;
use tracing::warn;
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, NoUninit)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(pos: Vec3, normal: Vec3, uv: [f32; 2]) -> Self {
        Self {
            pos: pos.to_array(),
            normal: normal.to_array(),
            color: [1.0, 1.0, 1.0, 1.0],
            uv,
        }
    }
}

/// Line vertex used by the physics debug overlay
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Axis-aligned bounding box in mesh space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
        Some(Self { min, max })
    }

    /// Width/height/depth
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn half_extents(&self) -> Vec3 {
        self.dimensions() * 0.5
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

static MESH_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    MESH_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// CPU-side triangle mesh. The revision changes on every geometry edit so
/// GPU caches can tell stale uploads apart.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    bounds: BoundingBox,
    revision: u64,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let points: Vec<Vec3> = vertices.iter().map(|v| Vec3::from_array(v.pos)).collect();
        let bounds = BoundingBox::from_points(&points).unwrap_or(BoundingBox {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
        });
        Self {
            vertices,
            indices,
            bounds,
            revision: next_revision(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.indices.is_empty()
    }

    pub fn num_verts(&self) -> usize {
        self.vertices.len()
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| Vec3::from_array(v.pos))
    }

    pub fn triangles(&self) -> Vec<[u32; 3]> {
        self.indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect()
    }

    /// Scale vertex positions in place by a per-axis ratio.
    /// Normals are rescaled by the inverse ratio and renormalized.
    pub fn scale_by(&mut self, ratio: Vec3) {
        let inv = Vec3::ONE / ratio;
        for v in self.vertices.iter_mut() {
            v.pos = (Vec3::from_array(v.pos) * ratio).to_array();
            let n = Vec3::from_array(v.normal) * inv;
            v.normal = n.normalize_or_zero().to_array();
        }
        self.bounds = BoundingBox {
            min: (self.bounds.min * ratio).min(self.bounds.max * ratio),
            max: (self.bounds.min * ratio).max(self.bounds.max * ratio),
        };
        self.revision = next_revision();
    }

    /// Axis-aligned box centered on the origin
    pub fn cuboid(half: Vec3) -> Self {
        let faces: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (normal + u * su + v * sv) * half;
                vertices.push(Vertex::new(p, normal, [(su + 1.0) * 0.5, (sv + 1.0) * 0.5]));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Closed cylinder along Y centered on the origin
    pub fn cylinder(radius: f32, half_height: f32, segments: u32) -> Self {
        let segments = segments.max(3);
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for i in 0..=segments {
            let t = i as f32 / segments as f32;
            let a = t * std::f32::consts::TAU;
            let n = Vec3::new(a.cos(), 0.0, a.sin());
            vertices.push(Vertex::new(n * radius - Vec3::Y * half_height, n, [t, 0.0]));
            vertices.push(Vertex::new(n * radius + Vec3::Y * half_height, n, [t, 1.0]));
        }
        for i in 0..segments {
            let b = i * 2;
            indices.extend_from_slice(&[b, b + 1, b + 3, b, b + 3, b + 2]);
        }
        for (y, normal) in [(-half_height, Vec3::NEG_Y), (half_height, Vec3::Y)] {
            let center = vertices.len() as u32;
            vertices.push(Vertex::new(Vec3::new(0.0, y, 0.0), normal, [0.5, 0.5]));
            for i in 0..=segments {
                let a = i as f32 / segments as f32 * std::f32::consts::TAU;
                let p = Vec3::new(a.cos() * radius, y, a.sin() * radius);
                vertices.push(Vertex::new(p, normal, [a.cos() * 0.5 + 0.5, a.sin() * 0.5 + 0.5]));
            }
            for i in 0..segments {
                let (p0, p1) = (center + 1 + i, center + 2 + i);
                if normal.y > 0.0 {
                    indices.extend_from_slice(&[center, p1, p0]);
                } else {
                    indices.extend_from_slice(&[center, p0, p1]);
                }
            }
        }
        Self::new(vertices, indices)
    }

    /// UV sphere centered on the origin
    pub fn uv_sphere(radius: f32, rings: u32, sectors: u32) -> Self {
        let (rings, sectors) = (rings.max(2), sectors.max(3));
        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for r in 0..=rings {
            let v = r as f32 / rings as f32;
            let phi = v * std::f32::consts::PI;
            for s in 0..=sectors {
                let u = s as f32 / sectors as f32;
                let theta = u * std::f32::consts::TAU;
                let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                vertices.push(Vertex::new(n * radius, n, [u, v]));
            }
        }
        let stride = sectors + 1;
        for r in 0..rings {
            for s in 0..sectors {
                let a = r * stride + s;
                let b = a + stride;
                indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        Self::new(vertices, indices)
    }

    pub fn upload(&self, device: &wgpu::Device) -> MeshBuffer {
        let vertices = bytemuck::cast_slice(&self.vertices);
        let indices = bytemuck::cast_slice(&self.indices);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: indices,
            usage: wgpu::BufferUsages::INDEX,
        });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: self.indices.len() as u32,
        }
    }
}

/// Parse a text field as a float. Returns NaN on malformed input; callers
/// must check `is_nan()` before applying the value.
pub fn parse_float(text: &str) -> f32 {
    match text.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => v,
        _ => {
            warn!("could not parse {:?} as a number", text);
            f32::NAN
        }
    }
}
