use glam::{Mat4, Vec3};

use crate::camera::Camera;
use crate::input::KeyState;
use crate::shader::ShaderProgram;

pub const LIGHT_POSITION: Vec3 = Vec3::new(0.5, 1.0, 0.3);
pub const CAMERA_START: Vec3 = Vec3::new(0.0, 0.0, 3.0);
pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 100.0;

/// Degrees per second the quad turns about its tilted axis.
const SPIN_RATE: f32 = -10.0;
const LIGHT_MARKER_SCALE: f32 = 0.1;

pub const DIFFUSE_UNIT: u32 = 0;
pub const NORMAL_UNIT: u32 = 1;

/// Values uploaded before each frame's two draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameUniforms {
    pub projection: Mat4,
    pub view: Mat4,
    pub view_position: Vec3,
    pub light_position: Vec3,
    pub quad_model: Mat4,
    pub light_model: Mat4,
}

/// The rotating brick quad lit by a fixed point light.
#[derive(Clone, Debug)]
pub struct NormalMappingScene {
    pub camera: Camera,
    pub light_position: Vec3,
}

impl Default for NormalMappingScene {
    fn default() -> Self {
        Self {
            camera: Camera::new(CAMERA_START),
            light_position: LIGHT_POSITION,
        }
    }
}

impl NormalMappingScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the sampler uniforms to their texture units.
    pub fn bind_samplers(program: &mut ShaderProgram) {
        program.set_int("diffuseMap", DIFFUSE_UNIT as i32);
        program.set_int("normalMap", NORMAL_UNIT as i32);
    }

    pub fn apply_input(&mut self, keys: &KeyState, delta_seconds: f32) {
        for movement in keys.movements() {
            self.camera.process_keyboard(movement, delta_seconds);
        }
    }

    pub fn frame_uniforms(&self, elapsed_seconds: f32, aspect: f32) -> FrameUniforms {
        let axis = Vec3::new(1.0, 0.0, 1.0).normalize();
        FrameUniforms {
            projection: self.camera.projection_matrix(aspect, NEAR_PLANE, FAR_PLANE),
            view: self.camera.view_matrix(),
            view_position: self.camera.position,
            light_position: self.light_position,
            quad_model: Mat4::from_axis_angle(axis, (elapsed_seconds * SPIN_RATE).to_radians()),
            light_model: Mat4::from_translation(self.light_position)
                * Mat4::from_scale(Vec3::splat(LIGHT_MARKER_SCALE)),
        }
    }
}

impl FrameUniforms {
    /// Pushes the values shared by both draws.
    pub fn apply_shared(&self, program: &mut ShaderProgram) {
        program.set_mat4("projection", self.projection);
        program.set_mat4("view", self.view);
        program.set_vec3("viewPos", self.view_position);
        program.set_vec3("lightPos", self.light_position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::KeyCode;

    #[test]
    fn quad_starts_unrotated() {
        let scene = NormalMappingScene::new();
        let uniforms = scene.frame_uniforms(0.0, 4.0 / 3.0);
        assert!(uniforms.quad_model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
        assert_eq!(uniforms.view_position, CAMERA_START);
        assert_eq!(uniforms.light_position, LIGHT_POSITION);
    }

    #[test]
    fn quad_spins_about_tilted_axis() {
        let scene = NormalMappingScene::new();
        let uniforms = scene.frame_uniforms(9.0, 1.0);
        let axis = Vec3::new(1.0, 0.0, 1.0).normalize();
        // Points on the rotation axis do not move.
        assert!(uniforms
            .quad_model
            .transform_point3(axis)
            .abs_diff_eq(axis, 1e-5));
        let expected = Mat4::from_axis_angle(axis, (-90.0f32).to_radians());
        assert!(uniforms.quad_model.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn light_marker_is_small_and_placed_at_the_light() {
        let scene = NormalMappingScene::new();
        let uniforms = scene.frame_uniforms(1.0, 1.0);
        let corner = uniforms.light_model.transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!(corner.abs_diff_eq(LIGHT_POSITION + Vec3::new(0.1, 0.1, 0.0), 1e-6));
    }

    #[test]
    fn held_keys_move_the_camera() {
        let mut scene = NormalMappingScene::new();
        let mut keys = KeyState::new();
        keys.set(KeyCode::KeyS, true);
        scene.apply_input(&keys, 0.4);
        assert!(scene
            .camera
            .position
            .abs_diff_eq(Vec3::new(0.0, 0.0, 4.0), 1e-5));
    }
}
