use glam::{Mat4, Vec3};

use crate::renderer::vertex::{v, Vertex};

/// Most bone matrices a single mesh can carry.
pub const MAX_BONES: usize = 64;

/// CPU-side mesh owned by a scene object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// Skinning palette; empty for static meshes.
    pub bones: Vec<Mat4>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            bones: Vec::new(),
        }
    }

    pub fn with_bones(mut self, bones: Vec<Mat4>) -> Self {
        self.bones = bones;
        self
    }

    /// Local-space bounds of the vertex positions.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|vertex| Vec3::from(vertex.position)))
    }

    /// Unit cube centred on the origin with per-face normals and tangents.
    pub fn cube() -> Self {
        // (normal, tangent, bitangent) per face
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ];
        let corners = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, tangent, bitangent) in faces {
            let (n, t, b) = (Vec3::from(normal), Vec3::from(tangent), Vec3::from(bitangent));
            let base = vertices.len() as u32;
            for [s, u] in corners {
                let position = (n + t * s + b * u) * 0.5;
                let mut vertex = v(
                    position.to_array(),
                    normal,
                    [(s + 1.0) * 0.5, (1.0 - u) * 0.5],
                );
                vertex.tangent = tangent;
                vertex.bitangent = bitangent;
                vertices.push(vertex);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(vertices, indices)
    }

    /// Full-screen quad in normalized device coordinates.
    pub fn screen_quad() -> Self {
        let vertices = vec![
            v([-1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
            v([1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
            v([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            v([-1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 0, 2, 3])
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| Aabb {
            min: acc.min.min(p),
            max: acc.max.max(p),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, b.z),
            Vec3::new(a.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after `matrix`, re-fitted to the world axes.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        Aabb::from_points(self.corners().into_iter().map(|c| matrix.transform_point3(c)))
    }

    /// Line-list mesh of the twelve box edges.
    pub fn wireframe(&self) -> MeshData {
        const EDGES: [u32; 24] = [
            0, 1, 1, 2, 2, 3, 3, 0, // near
            4, 5, 5, 6, 6, 7, 7, 4, // far
            0, 4, 1, 5, 2, 6, 3, 7, // sides
        ];
        let vertices = self
            .corners()
            .into_iter()
            .map(|c| v(c.to_array(), [0.0, 0.0, 0.0], [0.0, 0.0]))
            .collect();
        MeshData::new(vertices, EDGES.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_bounds_are_unit() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        let bounds = cube.bounds();
        assert!((bounds.min - Vec3::splat(-0.5)).length() < 1e-6);
        assert!((bounds.max - Vec3::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn transformed_box_follows_translation_and_scale() {
        let bounds = MeshData::cube().bounds();
        let matrix = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(10.0, 0.0, 0.0),
        );
        let world = bounds.transformed(&matrix);
        assert!((world.min - Vec3::new(9.0, -1.0, -1.0)).length() < 1e-5);
        assert!((world.max - Vec3::new(11.0, 1.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn empty_box_stays_empty() {
        let empty = Aabb::from_points(std::iter::empty());
        assert!(empty.is_empty());
        assert!(empty.transformed(&Mat4::IDENTITY).is_empty());
    }

    #[test]
    fn wireframe_has_twelve_edges() {
        let wire = MeshData::cube().bounds().wireframe();
        assert_eq!(wire.vertices.len(), 8);
        assert_eq!(wire.indices.len(), 24);
    }
}
