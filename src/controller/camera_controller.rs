use crate::controller::input::{InputProcessor, InputState};
use crate::controller::physics::PhysicsManager;
use crate::model::camera::{CAM_ROT_SPEED, CAM_SPEED};
use crate::model::{Camera, EntityManager, RotationMode};

/// Fraction of `CAM_SPEED` applied per second of held movement key
pub const CAM_STEP_FACTOR: f32 = 0.5;

/// Handles camera movement and orientation
#[derive(Debug, Clone)]
pub struct CameraController {
    pub move_speed: f32,
    pub rot_speed: f32,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            move_speed: CAM_SPEED,
            rot_speed: CAM_ROT_SPEED,
        }
    }

    pub fn cam_step(&self, dt: f32) -> f32 {
        self.move_speed * dt * CAM_STEP_FACTOR
    }

    /// Apply mouse look delta to camera (constrained mode only)
    pub fn apply_look(&self, camera: &mut Camera, dx: f32, dy: f32, width: f32, height: f32) {
        if camera.mode != RotationMode::ConstrainedYawPitch || (dx == 0.0 && dy == 0.0) {
            return;
        }
        camera.mouse_look(dx, dy, width, height);
    }

    /// Keyboard rotation. Yaw and pitch keys only act in the free mode;
    /// roll works in both.
    pub fn update_rotation(
        &self,
        camera: &mut Camera,
        processor: &InputProcessor,
        input: &InputState,
        dt: f32,
    ) {
        let rot = processor.rotation(input) * self.rot_speed * dt;
        if camera.mode == RotationMode::FreeQuaternion {
            if rot.x != 0.0 {
                camera.yaw(rot.x);
            }
            if rot.y != 0.0 {
                camera.pitch(rot.y);
            }
        }
        if rot.z != 0.0 {
            camera.roll(rot.z);
        }
    }

    /// Update camera velocity (or pending displacement) from held keys
    pub fn update_movement(
        &self,
        camera: &mut Camera,
        processor: &InputProcessor,
        input: &InputState,
        dt: f32,
        entities: &EntityManager,
        physics: &mut PhysicsManager,
    ) {
        let step = self.cam_step(dt);
        let movement = processor.movement(input) * step;

        if movement.x != 0.0 {
            camera.right(movement.x, entities, physics);
        }
        if movement.y != 0.0 {
            camera.fwd(movement.y, entities, physics);
        }
        if movement.z != 0.0 {
            camera.up(movement.z, entities, physics);
        }
        if processor.is_jumping(input) {
            camera.jump(step, entities, physics);
        }
        if processor.is_stabilizing(input) {
            camera.stabilize(step, entities, physics);
        }
    }
}
