use cgmath::{Deg, Matrix4, SquareMatrix};

/// Maps OpenGL depth [-1, 1] onto wgpu depth [0, 1]. Arguments are
/// column-major.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Perspective projection parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub aspect: f32,
    pub fovy: Deg<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            aspect: 16.0 / 9.0,
            fovy: Deg(50.0),
            znear: 0.1,
            zfar: 1000.0,
        }
    }
}

impl Projection {
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    /// View-projection for a camera whose world transform is `camera_world`
    pub fn view_proj(&self, camera_world: &Matrix4<f32>) -> Matrix4<f32> {
        let view = camera_world.invert().unwrap_or(Matrix4::identity());
        self.matrix() * view
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct CameraUniform {
    /// The eye position of the camera in homogenous coordinates.
    ///
    /// Homogenous coordinates are used to fullfill the 16 byte alignment requirement.
    pub view_position: [f32; 4],

    /// Contains the view projection matrix.
    pub view_proj: [[f32; 4]; 4],
}

impl Default for CameraUniform {
    /// Creates a default [CameraUniform].
    fn default() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::<f32>::identity().into(),
        }
    }
}

impl CameraUniform {
    pub fn new(camera_world: &Matrix4<f32>, projection: &Projection) -> Self {
        let eye = camera_world.w;
        Self {
            view_position: [eye.x, eye.y, eye.z, 1.0],
            view_proj: projection.view_proj(camera_world).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Vector3, Vector4};

    #[test]
    fn test_point_in_front_of_camera_projects_inside_clip_volume() {
        let camera_world = Matrix4::from_translation(Vector3::new(0.0, 0.0, 5.0));
        let view_proj = Projection::default().view_proj(&camera_world);

        let clip = view_proj * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip.truncate() / clip.w;

        approx::assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        approx::assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }

    #[test]
    fn test_near_and_far_planes_map_to_wgpu_depth_range() {
        let projection = Projection::default();
        let project = |z: f32| {
            let clip = projection.matrix() * Vector4::new(0.0, 0.0, z, 1.0);
            clip.z / clip.w
        };

        approx::assert_relative_eq!(project(-projection.znear), 0.0, epsilon = 1e-4);
        approx::assert_relative_eq!(project(-projection.zfar), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_center_pixel_ray_looks_down_negative_z() {
        let camera_world = Matrix4::from_translation(Vector3::new(0.0, 0.0, 10.0));
        let view_proj = Projection::default().view_proj(&camera_world);

        let ray = crate::gfx::picking::Ray::from_screen(49.5, 49.5, 100.0, 100.0, &view_proj).unwrap();

        assert!(ray.direction.z < -0.999, "direction {:?}", ray.direction);
        assert!(ray.origin.z < 10.0 && ray.origin.z > 9.8);
    }

    #[test]
    fn test_uniform_carries_eye_position() {
        let camera_world = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let uniform = CameraUniform::new(&camera_world, &Projection::default());
        assert_eq!(uniform.view_position, [1.0, 2.0, 3.0, 1.0]);
    }
}
