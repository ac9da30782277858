use bevy_math::{
    Mat4,
    UVec2,
    Vec2,
    Vec3,
    Vec4,
};
use serde::{
    Deserialize,
    Serialize,
};


pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 100.0;


/// pinhole camera looking down its `front` axis
///
/// view space is right-up-front, so visible points have positive depth.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[serde(default)]
pub struct Camera {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,

    /// vertical field of view in degrees
    pub fov: f32,
    pub aspect_ratio: f32,

    /// pixel size, required for focal length projection
    pub resolution: Option<UVec2>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            front: Vec3::Z,
            up: Vec3::Y,
            right: Vec3::X,
            fov: 60.0,
            aspect_ratio: 1.0,
            resolution: None,
        }
    }
}

impl Camera {
    pub fn look_at(position: Vec3, target: Vec3, world_up: Vec3) -> Self {
        let front = (target - position).normalize();
        let right = front.cross(world_up).normalize();
        let up = right.cross(front).normalize();

        Self {
            position,
            front,
            up,
            right,
            ..Default::default()
        }
    }

    pub fn with_fov(mut self, fov: f32) -> Self {
        self.fov = fov;
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: f32) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// sets the pixel size and matches the aspect ratio to it
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some(UVec2::new(width, height));
        self.aspect_ratio = width as f32 / height as f32;
        self
    }

    /// tangent of the half field of view along x and y
    pub fn tan_fov(&self) -> Vec2 {
        let tan_y = (self.fov.to_radians() * 0.5).tan();
        Vec2::new(tan_y * self.aspect_ratio, tan_y)
    }

    /// pixel focal lengths, available once a resolution is set
    pub fn focal(&self) -> Option<Vec2> {
        let resolution = self.resolution?.as_vec2();
        Some(resolution / (2.0 * self.tan_fov()))
    }

    pub fn local_to_world(&self) -> Mat4 {
        Mat4::from_cols(
            self.right.extend(0.0),
            self.up.extend(0.0),
            self.front.extend(0.0),
            self.position.extend(1.0),
        )
    }

    pub fn world_to_view(&self) -> Mat4 {
        Mat4::from_cols(
            Vec4::new(self.right.x, self.up.x, self.front.x, 0.0),
            Vec4::new(self.right.y, self.up.y, self.front.y, 0.0),
            Vec4::new(self.right.z, self.up.z, self.front.z, 0.0),
            Vec4::new(
                -self.position.dot(self.right),
                -self.position.dot(self.up),
                -self.position.dot(self.front),
                1.0,
            ),
        )
    }

    /// perspective projection with `w = z_view`, x and y scaled by the inverse tangents
    pub fn projection(&self, z_near: f32, z_far: f32) -> Mat4 {
        let tan_fov = self.tan_fov();
        let z_range = z_far - z_near;
        let a = z_far / z_range;
        let b = -z_far * z_near / z_range;

        Mat4::from_cols(
            Vec4::new(1.0 / tan_fov.x, 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0 / tan_fov.y, 0.0, 0.0),
            Vec4::new(0.0, 0.0, a, 1.0),
            Vec4::new(0.0, 0.0, b, 0.0),
        )
    }
}
