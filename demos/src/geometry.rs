//! Vertex data for the demo scenes.

use glam::{Mat4, Vec3};

/// Position and normal, laid out for a 24-byte vertex stride.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// A 2D position in normalized device coordinates.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayVertex {
    pub position: [f32; 2],
}

/// Uniform block read by the cube's vertex shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub mvp: [[f32; 4]; 4],
}

impl CameraUniforms {
    /// Camera orbiting the origin at `angle` radians.
    pub fn orbit(angle: f32, aspect_ratio: f32) -> Self {
        let eye = Vec3::new(angle.cos() * 4.0, 2.5, angle.sin() * 4.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let projection =
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, aspect_ratio, 0.1, 100.0);
        Self {
            mvp: (projection * view).to_cols_array_2d(),
        }
    }
}

/// Unit cube centered on the origin: four vertices per face so every face
/// gets its own normal.
pub fn cube() -> (Vec<MeshVertex>, Vec<u16>) {
    // (normal, tangent, bitangent) per face.
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, u, v) in faces {
        let base = vertices.len() as u16;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = (normal + u * su + v * sv) * 0.5;
            vertices.push(MeshVertex {
                position: position.to_array(),
                normal: normal.to_array(),
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Two triangles covering the rectangle from `min` to `max`.
pub fn overlay_quad(min: [f32; 2], max: [f32; 2]) -> [OverlayVertex; 6] {
    let corner = |x: f32, y: f32| OverlayVertex { position: [x, y] };
    [
        corner(min[0], min[1]),
        corner(max[0], min[1]),
        corner(max[0], max[1]),
        corner(min[0], min[1]),
        corner(max[0], max[1]),
        corner(min[0], max[1]),
    ]
}
