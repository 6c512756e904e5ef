use glam::{Mat4, Quat, Vec3, Vec4Swizzles};
use tracing::debug;

use crate::controller::physics::{BodyHandle, PhysicsManager};
use crate::controller::{CameraUniform, WorldUniform};
use crate::model::entity::EntityId;
use crate::model::entity_manager::EntityManager;
use crate::model::rotation::Rotation;

pub const CAM_SPEED: f32 = 5.0;
pub const CAM_REF_SPEED: f32 = 0.5;
pub const CAM_ROT_SPEED: f32 = 100.0;
pub const CAM_MAX_JUMP: f32 = 10.0;
pub const CAM_STABILIZE_FACTOR: f32 = 0.5;
pub const CAM_STABILIZE_MIN: f32 = 0.02;

/// How look input is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationMode {
    /// Keyboard-driven yaw/pitch/roll around the camera's own axes
    #[default]
    FreeQuaternion,
    /// Mouse-driven look with the cursor grabbed
    ConstrainedYawPitch,
}

impl RotationMode {
    pub fn toggled(self) -> Self {
        match self {
            RotationMode::FreeQuaternion => RotationMode::ConstrainedYawPitch,
            RotationMode::ConstrainedYawPitch => RotationMode::FreeQuaternion,
        }
    }
}

/// View camera.
///
/// `pos` is stored negated (it is the translation applied to the world),
/// so `view = rotation * translation(pos)` and the eye sits at `-pos`.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pos: Vec3,
    cam_move: Vec3,
    rotation: Rotation,
    rot_matrix: Mat4,
    trans_matrix: Mat4,
    view_matrix: Mat4,
    persp_matrix: Mat4,
    pub near: f32,
    pub far: f32,
    pub fov_deg: f32,
    pub aspect: f32,
    pub mode: RotationMode,
    pub moved: bool,
    cam_obj: Option<EntityId>,
}

impl Camera {
    pub fn new(near: f32, far: f32, fov_deg: f32, aspect: f32) -> Self {
        let mut cam = Self {
            pos: Vec3::ZERO,
            cam_move: Vec3::ZERO,
            rotation: Rotation::IDENTITY,
            rot_matrix: Mat4::IDENTITY,
            trans_matrix: Mat4::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            persp_matrix: Mat4::IDENTITY,
            near,
            far,
            fov_deg,
            aspect,
            mode: RotationMode::default(),
            moved: false,
            cam_obj: None,
        };
        cam.update_perspective();
        cam
    }

    pub fn update_perspective(&mut self) {
        self.persp_matrix =
            Mat4::perspective_rh(self.fov_deg.to_radians(), self.aspect.max(1e-4), self.near, self.far);
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
        self.update_perspective();
    }

    // ==================== Accessors ====================

    /// Negated eye position (see type docs)
    pub fn position(&self) -> Vec3 {
        self.pos
    }

    /// World-space eye position
    pub fn eye(&self) -> Vec3 {
        -self.pos
    }

    /// Place the eye directly. Only meaningful for unbound cameras; a bound
    /// camera re-reads its body on the next `update_cam_pos`.
    pub fn set_eye(&mut self, eye: Vec3) {
        self.pos = -eye;
        self.moved = true;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn rotation_matrix(&self) -> Mat4 {
        self.rot_matrix
    }

    pub fn translation_matrix(&self) -> Mat4 {
        self.trans_matrix
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    pub fn perspective_matrix(&self) -> Mat4 {
        self.persp_matrix
    }

    pub fn pending_move(&self) -> Vec3 {
        self.cam_move
    }

    // ==================== Binding ====================

    pub fn bind(&mut self, entity: Option<EntityId>) {
        self.cam_obj = entity;
    }

    pub fn bound_entity(&self) -> Option<EntityId> {
        self.cam_obj
    }

    /// Rigid body of the bound entity, if the binding still resolves
    pub fn bound_body(&self, entities: &EntityManager) -> Option<BodyHandle> {
        self.cam_obj
            .and_then(|id| entities.get(id))
            .and_then(|e| e.body_handle())
    }

    // ==================== Rotation ====================

    fn local_right(&self) -> Vec3 {
        self.rot_matrix.row(0).xyz()
    }

    fn local_up(&self) -> Vec3 {
        self.rot_matrix.row(1).xyz()
    }

    fn local_back(&self) -> Vec3 {
        self.rot_matrix.row(2).xyz()
    }

    fn apply_delta(&mut self, axis: Vec3, degrees: f32) {
        let delta = Rotation::from_degrees(axis, degrees);
        self.rotation = self.rotation * delta;
        self.rot_matrix = self.rotation.matrix();
        self.moved = true;
    }

    pub fn yaw(&mut self, degrees: f32) {
        self.apply_delta(self.local_up(), degrees);
    }

    pub fn pitch(&mut self, degrees: f32) {
        self.apply_delta(self.local_right(), degrees);
    }

    pub fn roll(&mut self, degrees: f32) {
        self.apply_delta(-self.local_back(), degrees);
    }

    pub fn rotate(&mut self, rotation: Rotation) {
        self.rotation = rotation;
        self.rot_matrix = self.rotation.matrix();
        self.moved = true;
    }

    /// Orient the camera so that `focus` lies straight ahead
    pub fn look_at(&mut self, focus: Vec3) {
        let Some(dir) = (focus - self.eye()).try_normalize() else {
            return;
        };
        let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view_rot = Mat4::look_to_rh(Vec3::ZERO, dir, up);
        self.rotate(Rotation::from_quat(Quat::from_mat4(&view_rot)));
    }

    /// XY-mode mouse look: `dx`/`dy` in pixels relative to the window size
    pub fn mouse_look(&mut self, dx: f32, dy: f32, width: f32, height: f32) {
        let x_theta = dx / width.max(1.0) * -50.0;
        let y_theta = dy / height.max(1.0) * -50.0;
        let qx = Rotation::from_degrees(self.local_up(), x_theta);
        let qy = Rotation::from_degrees(self.local_right(), y_theta);
        self.rotate(self.rotation * (qx * qy));
    }

    // ==================== Movement ====================

    pub fn right(&mut self, amount: f32, entities: &EntityManager, physics: &mut PhysicsManager) {
        let dir = self.local_right();
        self.delta_v(dir, amount, entities, physics);
    }

    pub fn fwd(&mut self, amount: f32, entities: &EntityManager, physics: &mut PhysicsManager) {
        let dir = -self.local_back();
        self.delta_v(dir, amount, entities, physics);
    }

    pub fn up(&mut self, amount: f32, entities: &EntityManager, physics: &mut PhysicsManager) {
        let dir = self.local_up();
        self.delta_v(dir, amount, entities, physics);
    }

    /// Push the bound body (velocity clamped per axis to ±CAM_SPEED) or,
    /// when unbound, accumulate a displacement for the next position update.
    pub fn delta_v(
        &mut self,
        dir: Vec3,
        dv: f32,
        entities: &EntityManager,
        physics: &mut PhysicsManager,
    ) {
        match self.bound_body(entities) {
            Some(body) => {
                physics.activate(body);
                let velocity = (physics.linear_velocity(body) + dir * dv)
                    .clamp(Vec3::splat(-CAM_SPEED), Vec3::splat(CAM_SPEED));
                physics.set_linear_velocity(body, velocity);
                physics.apply_central_impulse(body, Vec3::ZERO);
            }
            None => self.cam_move += dir * dv * CAM_REF_SPEED,
        }
        self.moved = true;
    }

    pub fn jump(&mut self, magnitude: f32, entities: &EntityManager, physics: &mut PhysicsManager) {
        let Some(body) = self.bound_body(entities) else {
            return;
        };
        if physics.linear_velocity(body).y <= CAM_MAX_JUMP {
            physics.apply_central_impulse(body, Vec3::new(0.0, magnitude * 4.0, 0.0));
        }
    }

    /// Damp the bound body's velocity toward zero, snapping small axes to 0
    pub fn stabilize(&mut self, step: f32, entities: &EntityManager, physics: &mut PhysicsManager) {
        let Some(body) = self.bound_body(entities) else {
            return;
        };
        let k = (CAM_STABILIZE_FACTOR * step).clamp(0.0, 1.0);
        let mut v = physics.linear_velocity(body);
        for i in 0..3 {
            v[i] -= v[i] * k;
            if v[i].abs() < CAM_STABILIZE_MIN {
                v[i] = 0.0;
            }
        }
        physics.set_linear_velocity(body, v);
    }

    /// Per-frame position refresh and matrix rebuild
    pub fn update_cam_pos(&mut self, entities: &EntityManager, physics: &PhysicsManager) {
        match self.bound_body(entities).and_then(|b| physics.translation(b)) {
            Some(translation) => self.pos = -translation,
            None => {
                if let Some(id) = self.cam_obj {
                    if entities.get(id).is_none() {
                        debug!(?id, "camera binding no longer resolves, unbinding");
                        self.cam_obj = None;
                    }
                }
                // cam_move is a world-space eye displacement
                self.pos -= self.cam_move;
            }
        }
        self.cam_move = Vec3::ZERO;
        self.trans_matrix = Mat4::from_translation(self.pos);
        self.view_matrix = self.rot_matrix * self.trans_matrix;
        self.moved = false;
    }

    /// Camera block: identity transform, view, perspective (48 floats)
    pub fn uniform(&self) -> CameraUniform {
        CameraUniform {
            transform: Mat4::IDENTITY.to_cols_array_2d(),
            view: self.view_matrix.to_cols_array_2d(),
            proj: self.persp_matrix.to_cols_array_2d(),
        }
    }

    pub fn world_uniform(&self) -> WorldUniform {
        WorldUniform {
            near: self.near,
            far: self.far,
            _pad: [0.0; 2],
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.persp_matrix * self.view_matrix
    }

    /// World-space direction through pixel (`px`, `py`)
    pub fn mouse_ray(&self, px: f32, py: f32, width: f32, height: f32) -> Vec3 {
        let x = 2.0 * px / width.max(1.0) - 1.0;
        let y = 1.0 - 2.0 * py / height.max(1.0);
        let eye_ray = self.persp_matrix.inverse() * glam::Vec4::new(x, y, -1.0, 1.0);
        let eye_ray = glam::Vec4::new(eye_ray.x, eye_ray.y, -1.0, 0.0);
        (self.view_matrix.inverse() * eye_ray)
            .xyz()
            .try_normalize()
            .unwrap_or(Vec3::NEG_Z)
    }

    /// World-space forward axis
    pub fn forward(&self) -> Vec3 {
        -self.local_back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::assets::AssetStore;
    use crate::model::entity::{Entity, EntityKind};
    use crate::utils::Mesh;
    use approx::assert_abs_diff_eq;

    fn camera() -> Camera {
        Camera::new(0.1, 1000.0, 50.625, 16.0 / 9.0)
    }

    fn world_with_body(pos: Vec3) -> (EntityManager, PhysicsManager, EntityId) {
        let mut assets = AssetStore::new("/nonexistent");
        assets.insert_mesh(EntityKind::Flowerpot.mesh_path(), Mesh::cylinder(0.25, 0.5, 12));
        let mut physics = PhysicsManager::new();
        let mut entities = EntityManager::new();
        let entity = Entity::spawn(
            EntityKind::Flowerpot,
            pos,
            Rotation::IDENTITY,
            &mut assets,
            &mut physics,
            false,
        );
        let id = entities.add(entity);
        (entities, physics, id)
    }

    #[test]
    fn test_bound_camera_reads_negated_body_position() {
        let (entities, physics, id) = world_with_body(Vec3::new(1.0, 2.0, 3.0));
        let mut cam = camera();
        cam.bind(Some(id));
        cam.update_cam_pos(&entities, &physics);
        assert_abs_diff_eq!(cam.position().x, -1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(cam.position().y, -2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(cam.position().z, -3.0, epsilon = 1e-5);
        assert!(!cam.moved);
    }

    #[test]
    fn test_view_is_rotation_times_translation() {
        let entities = EntityManager::new();
        let physics = PhysicsManager::new();
        let mut cam = camera();
        cam.set_eye(Vec3::new(3.0, 0.0, -2.0));
        cam.yaw(90.0);
        cam.update_cam_pos(&entities, &physics);
        let expected = cam.rotation_matrix() * cam.translation_matrix();
        assert!(cam.view_matrix().abs_diff_eq(expected, 1e-6));
        let wrong_order = cam.translation_matrix() * cam.rotation_matrix();
        assert!(!cam.view_matrix().abs_diff_eq(wrong_order, 1e-3));
    }

    #[test]
    fn test_yaw_pitch_roll_keep_axis_angle_consistent() {
        let mut cam = camera();
        cam.yaw(33.0);
        cam.pitch(-12.0);
        cam.roll(71.0);
        cam.yaw(200.0);
        let r = cam.rotation();
        let rebuilt = Rotation::from_axis_angle(r.axis(), r.angle());
        assert!(rebuilt.matrix().abs_diff_eq(cam.rotation_matrix(), 1e-5));
        assert!(cam.moved);
    }

    #[test]
    fn test_speed_clamp_under_repeated_pushes() {
        let (entities, mut physics, id) = world_with_body(Vec3::ZERO);
        let mut cam = camera();
        cam.bind(Some(id));
        cam.update_cam_pos(&entities, &physics);
        let body = cam.bound_body(&entities).unwrap();
        for _ in 0..100 {
            cam.delta_v(Vec3::new(1.0, -1.0, 0.5), 3.0, &entities, &mut physics);
            let v = physics.linear_velocity(body);
            for i in 0..3 {
                assert!(v[i].abs() <= CAM_SPEED + 1e-5);
            }
        }
        assert_abs_diff_eq!(physics.linear_velocity(body).x, CAM_SPEED, epsilon = 1e-5);
    }

    #[test]
    fn test_stabilize_converges_without_overshoot() {
        let (entities, mut physics, id) = world_with_body(Vec3::ZERO);
        let mut cam = camera();
        cam.bind(Some(id));
        let body = cam.bound_body(&entities).unwrap();
        physics.set_linear_velocity(body, Vec3::new(4.0, -3.0, 0.5));
        let mut last = physics.linear_velocity(body);
        for _ in 0..200 {
            cam.stabilize(0.1, &entities, &mut physics);
            let v = physics.linear_velocity(body);
            for i in 0..3 {
                assert!(v[i].abs() <= last[i].abs());
                assert!(v[i] == 0.0 || v[i].signum() == last[i].signum());
            }
            last = v;
        }
        assert_eq!(last, Vec3::ZERO);
    }

    #[test]
    fn test_unbound_camera_integrates_displacement() {
        let entities = EntityManager::new();
        let mut physics = PhysicsManager::new();
        let mut cam = camera();
        cam.fwd(2.0, &entities, &mut physics);
        assert!(cam.moved);
        cam.update_cam_pos(&entities, &physics);
        // identity orientation looks down -Z
        assert_abs_diff_eq!(cam.eye().z, -2.0 * CAM_REF_SPEED, epsilon = 1e-6);
        assert_eq!(cam.pending_move(), Vec3::ZERO);
        cam.update_cam_pos(&entities, &physics);
        assert_abs_diff_eq!(cam.eye().z, -2.0 * CAM_REF_SPEED, epsilon = 1e-6);
    }

    #[test]
    fn test_dangling_binding_is_dropped() {
        let (mut entities, mut physics, id) = world_with_body(Vec3::ONE);
        let mut cam = camera();
        cam.bind(Some(id));
        let mut selection = crate::model::Selection::default();
        assert!(entities.evict(id, &mut physics, &mut selection));
        cam.update_cam_pos(&entities, &physics);
        assert_eq!(cam.bound_entity(), None);
    }

    #[test]
    fn test_look_at_faces_target() {
        let entities = EntityManager::new();
        let physics = PhysicsManager::new();
        let mut cam = camera();
        cam.set_eye(Vec3::new(1.0, 0.0, 0.0));
        cam.look_at(Vec3::new(1.0, 0.0, 10.0));
        cam.update_cam_pos(&entities, &physics);
        let fwd = cam.forward();
        assert_abs_diff_eq!(fwd.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_center_mouse_ray_matches_forward() {
        let entities = EntityManager::new();
        let physics = PhysicsManager::new();
        let mut cam = camera();
        cam.yaw(30.0);
        cam.update_cam_pos(&entities, &physics);
        let ray = cam.mouse_ray(640.0, 360.0, 1280.0, 720.0);
        assert!(ray.abs_diff_eq(cam.forward(), 1e-4));
    }
}
