use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Number of `vec4` parameter slots each draw carries.
pub const PARAMETER_SLOTS: usize = 4;

/// Per-frame camera block, group 0 binding 0.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    pub fn from_matrix(view_proj: Mat4, camera_pos: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_pos: camera_pos.to_array(),
            _padding: 0.0,
        }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::from_matrix(Mat4::IDENTITY, Vec3::ZERO)
    }
}

/// One entry of the per-draw object storage buffer, indexed by instance.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ObjectData {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of `model`, upper 3x3 used.
    pub normal: [[f32; 4]; 4],
    pub params: [[f32; 4]; PARAMETER_SLOTS],
}

impl ObjectData {
    pub fn new(model: Mat4, params: [[f32; 4]; PARAMETER_SLOTS]) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_uniform_is_144_bytes() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 144);
    }

    #[test]
    fn object_data_is_192_bytes() {
        assert_eq!(std::mem::size_of::<ObjectData>(), 192);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let data = ObjectData::new(model, [[0.0; 4]; PARAMETER_SLOTS]);
        let normal = Mat4::from_cols_array_2d(&data.normal);
        let n = normal.transform_vector3(Vec3::X);
        assert!((n.x - 0.5).abs() < 1e-6);
    }
}
