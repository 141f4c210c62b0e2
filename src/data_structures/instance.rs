//! Per-instance transformation data for GPU rendering.
//!
//! Every instanced draw uploads one [`InstanceRaw`] per copy of the mesh: the model
//! matrix, the matrix that carries normals into world space and the handedness of the
//! transform so mirrored instances keep their tangent frame.

use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix};

use crate::data_structures::model;

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    handedness: f32,
}

impl InstanceRaw {
    /// Packs a world matrix. Normals use the inverse transpose of its upper 3x3 so
    /// non-uniform scale does not skew them.
    pub fn from_matrix(matrix: Matrix4<f32>) -> Self {
        let linear = Matrix3::from_cols(
            matrix.x.truncate(),
            matrix.y.truncate(),
            matrix.z.truncate(),
        );
        let normal = linear
            .invert()
            .map(|inverse| inverse.transpose())
            .unwrap_or(linear);
        Self {
            model: matrix.into(),
            normal: normal.into(),
            handedness: linear.determinant().signum(),
        }
    }

    pub fn model(&self) -> Matrix4<f32> {
        self.model.into()
    }

    pub fn handedness(&self) -> f32 {
        self.handedness
    }
}

impl From<Matrix4<f32>> for InstanceRaw {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self::from_matrix(matrix)
    }
}

/**
 * As we store vertex data directly in the GPU memory we need to tell what the bytes refer to:
 *
 * offset: zero as we want to use the full space.
 * stride: length of an instance
 *
 * Stride layout here: the model matrix as four 4d vectors, the normal matrix as three 3d
 * vectors and the handedness.
 */
impl model::Vertex for InstanceRaw {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            // Shaders advance to the next instance only when a new instance starts
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 5,
                    format: wgpu::VertexFormat::Float32x4,
                },
                // A mat4 takes up four vertex slots
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 4]>() as wgpu::BufferAddress,
                    shader_location: 6,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 7,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 8,
                    format: wgpu::VertexFormat::Float32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 16]>() as wgpu::BufferAddress,
                    shader_location: 9,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 19]>() as wgpu::BufferAddress,
                    shader_location: 10,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 22]>() as wgpu::BufferAddress,
                    shader_location: 11,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 25]>() as wgpu::BufferAddress,
                    shader_location: 12,
                    format: wgpu::VertexFormat::Float32,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use cgmath::{Vector3, Vector4};

    use super::*;

    #[test]
    fn mirrored_matrices_flip_handedness() {
        assert_eq!(InstanceRaw::from_matrix(Matrix4::identity()).handedness(), 1.0);
        let mirrored = Matrix4::from_nonuniform_scale(-1.0, 1.0, 1.0);
        assert_eq!(InstanceRaw::from_matrix(mirrored).handedness(), -1.0);
    }

    #[test]
    fn normals_stay_perpendicular_under_non_uniform_scale() {
        let raw = InstanceRaw::from_matrix(Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0));
        let normal = Matrix3::from(raw.normal) * Vector3::new(1.0, 1.0, 0.0);
        assert_relative_eq!(normal, Vector3::new(0.5, 1.0, 0.0));
        assert_relative_eq!(
            raw.model() * Vector4::new(1.0, 0.0, 0.0, 1.0),
            Vector4::new(2.0, 0.0, 0.0, 1.0)
        );
    }
}
