use std::cmp::Ordering;
use std::collections::HashSet;

use glam::{Mat4, Quat, Vec3};
use rapier3d::na::{Quaternion, UnitQuaternion};
use rapier3d::prelude as rapier;
use tracing::{debug, trace, warn};

use crate::utils::Mesh;

pub const PHYS_TIME_STEP: f32 = 1.0 / 120.0;
pub const PHYS_MAX_SUBSTEPS: usize = 6;

/// Collision group bits
pub const CT_NORMAL: u32 = 1;
pub const CT_NOCOL: u32 = 2;

/// Smallest extent used when deriving a shape from a flat or empty mesh
const MIN_EXTENT: f32 = 1e-3;

fn to_vector(v: Vec3) -> rapier::Vector<f32> {
    rapier::Vector::new(v.x, v.y, v.z)
}

fn from_vector(v: &rapier::Vector<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

fn to_isometry(pos: Vec3, rot: Quat) -> rapier::Isometry<f32> {
    let q = UnitQuaternion::new_normalize(Quaternion::new(rot.w, rot.x, rot.y, rot.z));
    rapier::Isometry::from_parts(rapier::Translation::new(pos.x, pos.y, pos.z), q)
}

fn from_rotation(q: &UnitQuaternion<f32>) -> Quat {
    let c = q.coords;
    Quat::from_xyzw(c.x, c.y, c.z, c.w)
}

/// Identity of a rigid body inside the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(rapier::RigidBodyHandle);

impl BodyHandle {
    fn raw(&self) -> (u32, u32) {
        self.0.into_raw_parts()
    }
}

impl Ord for BodyHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw().cmp(&other.raw())
    }
}

impl PartialOrd for BodyHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Unordered pair of touching bodies, stored lowest handle first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair(BodyHandle, BodyHandle);

impl CollisionPair {
    pub fn new(a: BodyHandle, b: BodyHandle) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> BodyHandle {
        self.0
    }

    pub fn second(&self) -> BodyHandle {
        self.1
    }

    pub fn contains(&self, body: BodyHandle) -> bool {
        self.0 == body || self.1 == body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionEvent {
    Began(CollisionPair),
    Ended(CollisionPair),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Sphere,
    Box,
    Cylinder,
    Capsule,
    Cone,
    TriMesh,
}

/// Shape selector plus the static/dynamic variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeSpec {
    pub kind: ShapeKind,
    pub immobile: bool,
}

impl ShapeSpec {
    pub const fn dynamic(kind: ShapeKind) -> Self {
        Self { kind, immobile: false }
    }

    pub const fn fixed(kind: ShapeKind) -> Self {
        Self { kind, immobile: true }
    }
}

/// Derive a collision shape from a mesh's bounding box (or its triangles).
pub fn shape_from_mesh(kind: ShapeKind, mesh: &Mesh) -> rapier::SharedShape {
    let dims = mesh.bounds().dimensions().max(Vec3::splat(MIN_EXTENT));
    let half = dims * 0.5;
    match kind {
        ShapeKind::Sphere => rapier::SharedShape::ball(dims.max_element() * 0.5),
        ShapeKind::Box => rapier::SharedShape::cuboid(half.x, half.y, half.z),
        ShapeKind::Cylinder => rapier::SharedShape::cylinder(half.y, (half.x + half.z) * 0.5),
        ShapeKind::Cone => rapier::SharedShape::cone(half.y, (half.x + half.z) * 0.5),
        ShapeKind::Capsule => capsule_from_dims(dims),
        ShapeKind::TriMesh => {
            let points: Vec<rapier::Point<f32>> = mesh
                .positions()
                .map(|p| rapier::Point::new(p.x, p.y, p.z))
                .collect();
            let triangles = mesh.triangles();
            if points.is_empty() || triangles.is_empty() {
                warn!("triangle-mesh shape requested for an empty mesh, using a box");
                rapier::SharedShape::cuboid(half.x, half.y, half.z)
            } else {
                rapier::SharedShape::trimesh(points, triangles)
            }
        }
    }
}

/// The longest axis is the capsule axis; the radius is the larger of the
/// two remaining half extents.
fn capsule_from_dims(dims: Vec3) -> rapier::SharedShape {
    let (axis, radius) = if dims.y >= dims.x && dims.y >= dims.z {
        (1, dims.x.max(dims.z) * 0.5)
    } else if dims.x >= dims.z {
        (0, dims.y.max(dims.z) * 0.5)
    } else {
        (2, dims.x.max(dims.y) * 0.5)
    };
    let segment_half = ((dims[axis] - 2.0 * radius) * 0.5).max(0.0);
    match axis {
        0 => rapier::SharedShape::capsule_x(segment_half, radius),
        1 => rapier::SharedShape::capsule_y(segment_half, radius),
        _ => rapier::SharedShape::capsule_z(segment_half, radius),
    }
}

/// Exclusively owned physics record of one entity (or the player).
///
/// There is no `Clone`; the only way to dispose of it is
/// [`PhysicsManager::remove_body`], which takes it by value and removes
/// constraints, then the collider, then the body.
#[derive(Debug)]
pub struct PhysicsBody {
    handle: BodyHandle,
    collider: rapier::ColliderHandle,
    kind: ShapeKind,
    mass: f32,
    constraints: Vec<rapier::ImpulseJointHandle>,
    angle_limit: Option<rapier::ImpulseJointHandle>,
}

impl PhysicsBody {
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn is_static(&self) -> bool {
        self.mass == 0.0
    }

    pub fn has_angle_limit(&self) -> bool {
        self.angle_limit.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: Option<BodyHandle>,
    pub point: Vec3,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugLine {
    pub from: Vec3,
    pub to: Vec3,
    pub color: Vec3,
}

/// Owns the rapier world and the collision-pair bookkeeping
pub struct PhysicsManager {
    pipeline: rapier::PhysicsPipeline,
    gravity: rapier::Vector<f32>,
    integration_params: rapier::IntegrationParameters,
    islands: rapier::IslandManager,
    broad_phase: rapier::DefaultBroadPhase,
    narrow_phase: rapier::NarrowPhase,
    impulse_joints: rapier::ImpulseJointSet,
    multibody_joints: rapier::MultibodyJointSet,
    ccd_solver: rapier::CCDSolver,
    query_pipeline: rapier::QueryPipeline,
    bodies: rapier::RigidBodySet,
    colliders: rapier::ColliderSet,
    anchor: rapier::RigidBodyHandle,
    accumulated_time: f32,
    touching: HashSet<CollisionPair>,
    events: Vec<CollisionEvent>,
    pub debug_draw: bool,
}

impl Default for PhysicsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsManager {
    /// Zero-gravity world with a fixed anchor body for world-space constraints
    pub fn new() -> Self {
        let mut integration_params = rapier::IntegrationParameters::default();
        integration_params.dt = PHYS_TIME_STEP;

        let mut bodies = rapier::RigidBodySet::new();
        let anchor = bodies.insert(rapier::RigidBodyBuilder::fixed().build());

        Self {
            pipeline: rapier::PhysicsPipeline::new(),
            gravity: rapier::Vector::new(0.0, 0.0, 0.0),
            integration_params,
            islands: rapier::IslandManager::new(),
            broad_phase: rapier::DefaultBroadPhase::new(),
            narrow_phase: rapier::NarrowPhase::new(),
            impulse_joints: rapier::ImpulseJointSet::new(),
            multibody_joints: rapier::MultibodyJointSet::new(),
            ccd_solver: rapier::CCDSolver::new(),
            query_pipeline: rapier::QueryPipeline::new(),
            bodies,
            colliders: rapier::ColliderSet::new(),
            anchor,
            accumulated_time: 0.0,
            touching: HashSet::new(),
            events: Vec::new(),
            debug_draw: false,
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = to_vector(gravity);
    }

    pub fn gravity(&self) -> Vec3 {
        from_vector(&self.gravity)
    }

    /// Number of simulated bodies, excluding the world anchor
    pub fn num_bodies(&self) -> usize {
        self.bodies.len().saturating_sub(1)
    }

    pub fn num_constraints(&self) -> usize {
        self.impulse_joints.len()
    }

    // ==================== Bodies ====================

    pub fn create_body(
        &mut self,
        shape: rapier::SharedShape,
        kind: ShapeKind,
        mass: f32,
        position: Vec3,
        rotation: Quat,
    ) -> PhysicsBody {
        let builder = if mass > 0.0 {
            rapier::RigidBodyBuilder::dynamic()
        } else {
            rapier::RigidBodyBuilder::fixed()
        };
        let handle = self
            .bodies
            .insert(builder.position(to_isometry(position, rotation)).build());

        let mut collider = rapier::ColliderBuilder::new(shape).collision_groups(groups(CT_NORMAL, CT_NORMAL));
        if mass > 0.0 {
            collider = collider.mass(mass);
        }
        let collider = self
            .colliders
            .insert_with_parent(collider.build(), handle, &mut self.bodies);

        debug!(?kind, mass, ?position, "created rigid body");
        PhysicsBody {
            handle: BodyHandle(handle),
            collider,
            kind,
            mass,
            constraints: Vec::new(),
            angle_limit: None,
        }
    }

    /// Remove a body and everything attached to it. Constraints go first,
    /// then the collider, then the body itself.
    pub fn remove_body(&mut self, body: PhysicsBody) {
        let PhysicsBody {
            handle,
            collider,
            constraints,
            angle_limit,
            ..
        } = body;
        for joint in constraints.into_iter().chain(angle_limit) {
            self.impulse_joints.remove(joint, true);
        }
        self.colliders
            .remove(collider, &mut self.islands, &mut self.bodies, true);
        self.bodies.remove(
            handle.0,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        self.touching.retain(|pair| !pair.contains(handle));
        debug!(?handle, "removed rigid body");
    }

    /// Replace a body's collision shape (used after rescaling its mesh)
    pub fn set_shape(&mut self, body: &PhysicsBody, shape: rapier::SharedShape) {
        if let Some(collider) = self.colliders.get_mut(body.collider) {
            collider.set_shape(shape);
            if body.mass > 0.0 {
                collider.set_mass(body.mass);
            }
        }
        self.activate(body.handle);
    }

    pub fn contains(&self, body: BodyHandle) -> bool {
        self.bodies.contains(body.0)
    }

    /// Column-major world transform of the body
    pub fn world_transform(&self, body: BodyHandle) -> Option<Mat4> {
        self.bodies.get(body.0).map(|b| {
            let iso = b.position();
            Mat4::from_rotation_translation(
                from_rotation(&iso.rotation),
                from_vector(&iso.translation.vector),
            )
        })
    }

    pub fn translation(&self, body: BodyHandle) -> Option<Vec3> {
        self.bodies.get(body.0).map(|b| from_vector(b.translation()))
    }

    pub fn rotation(&self, body: BodyHandle) -> Option<Quat> {
        self.bodies.get(body.0).map(|b| from_rotation(b.rotation()))
    }

    /// Teleport the body and wake it
    pub fn set_transform(&mut self, body: BodyHandle, position: Vec3, rotation: Quat) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.set_position(to_isometry(position, rotation), true);
        }
    }

    pub fn activate(&mut self, body: BodyHandle) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.wake_up(true);
        }
    }

    pub fn is_sleeping(&self, body: BodyHandle) -> bool {
        self.bodies.get(body.0).map(|b| b.is_sleeping()).unwrap_or(false)
    }

    pub fn linear_velocity(&self, body: BodyHandle) -> Vec3 {
        self.bodies
            .get(body.0)
            .map(|b| from_vector(b.linvel()))
            .unwrap_or(Vec3::ZERO)
    }

    pub fn set_linear_velocity(&mut self, body: BodyHandle, velocity: Vec3) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.set_linvel(to_vector(velocity), true);
        }
    }

    pub fn apply_central_impulse(&mut self, body: BodyHandle, impulse: Vec3) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.apply_impulse(to_vector(impulse), true);
        }
    }

    pub fn set_sleep_thresholds(&mut self, body: BodyHandle, linear: f32, angular: f32) {
        if let Some(b) = self.bodies.get_mut(body.0) {
            let activation = b.activation_mut();
            activation.normalized_linear_threshold = linear;
            activation.angular_threshold = angular;
        }
    }

    pub fn change_collision_mask(&mut self, body: &PhysicsBody, group: u32, mask: u32) {
        if let Some(c) = self.colliders.get_mut(body.collider) {
            c.set_collision_groups(groups(group, mask));
        }
    }

    // ==================== Constraints ====================

    /// Limit the body's orientation (radians per axis) relative to the world.
    /// Axes with an empty range are locked. Replaces any previous limit.
    pub fn set_global_angle_limit(&mut self, body: &mut PhysicsBody, lower: Vec3, upper: Vec3) {
        self.remove_global_angle_limit(body);

        let current = self.rotation(body.handle).unwrap_or(Quat::IDENTITY);
        let mut locked = rapier::JointAxesMask::empty();
        let axes = [
            (rapier::JointAxis::AngX, rapier::JointAxesMask::ANG_X, 0),
            (rapier::JointAxis::AngY, rapier::JointAxesMask::ANG_Y, 1),
            (rapier::JointAxis::AngZ, rapier::JointAxesMask::ANG_Z, 2),
        ];
        for (_, mask, i) in axes {
            if upper[i] <= lower[i] {
                locked |= mask;
            }
        }
        let mut joint = rapier::GenericJointBuilder::new(locked)
            .local_frame1(to_isometry(Vec3::ZERO, current));
        for (axis, _, i) in axes {
            if upper[i] > lower[i] {
                joint = joint.limits(axis, [lower[i], upper[i]]);
            }
        }
        let handle = self
            .impulse_joints
            .insert(self.anchor, body.handle.0, joint.build(), true);
        body.angle_limit = Some(handle);
        trace!(?lower, ?upper, "set global angle limit");
    }

    pub fn remove_global_angle_limit(&mut self, body: &mut PhysicsBody) {
        if let Some(joint) = body.angle_limit.take() {
            self.impulse_joints.remove(joint, true);
        }
    }

    // ==================== Simulation ====================

    /// Advance by `dt` seconds in fixed substeps. Returns the substep count.
    pub fn step(&mut self, dt: f32) -> usize {
        self.accumulated_time += dt.max(0.0);

        let mut steps = 0;
        while self.accumulated_time >= PHYS_TIME_STEP && steps < PHYS_MAX_SUBSTEPS {
            self.pipeline.step(
                &self.gravity,
                &self.integration_params,
                &mut self.islands,
                &mut self.broad_phase,
                &mut self.narrow_phase,
                &mut self.bodies,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                &mut self.ccd_solver,
                None,
                &(),
                &(),
            );
            self.accumulated_time -= PHYS_TIME_STEP;
            steps += 1;
        }
        // Drop any backlog the substep cap could not absorb
        if steps == PHYS_MAX_SUBSTEPS {
            self.accumulated_time = self.accumulated_time.min(PHYS_TIME_STEP);
        }

        if steps > 0 {
            self.detect_collisions();
        }
        self.query_pipeline.update(&self.colliders);
        steps
    }

    fn detect_collisions(&mut self) {
        let mut current = HashSet::new();
        for pair in self.narrow_phase.contact_pairs() {
            if !pair.has_any_active_contact {
                continue;
            }
            let parent = |h| self.colliders.get(h).and_then(|c| c.parent());
            if let (Some(a), Some(b)) = (parent(pair.collider1), parent(pair.collider2)) {
                current.insert(CollisionPair::new(BodyHandle(a), BodyHandle(b)));
            }
        }

        for pair in current.difference(&self.touching) {
            self.events.push(CollisionEvent::Began(*pair));
        }
        for pair in self.touching.difference(&current) {
            self.events.push(CollisionEvent::Ended(*pair));
        }
        self.touching = current;
    }

    pub fn touching_pairs(&self) -> &HashSet<CollisionPair> {
        &self.touching
    }

    pub fn take_collision_events(&mut self) -> Vec<CollisionEvent> {
        std::mem::take(&mut self.events)
    }

    // ==================== Queries ====================

    /// First hit along `dir` within `max_distance`, ignoring `exclude`
    pub fn cast_ray(
        &self,
        origin: Vec3,
        dir: Vec3,
        max_distance: f32,
        exclude: Option<BodyHandle>,
    ) -> Option<RayHit> {
        let dir = dir.try_normalize()?;
        let ray = rapier::Ray::new(rapier::Point::new(origin.x, origin.y, origin.z), to_vector(dir));
        self.query_pipeline
            .cast_ray(
                &self.bodies,
                &self.colliders,
                &ray,
                max_distance,
                true,
                match exclude {
                    Some(body) => rapier::QueryFilter::new().exclude_rigid_body(body.0),
                    None => rapier::QueryFilter::new(),
                },
            )
            .map(|(collider, toi)| {
                let point = ray.point_at(toi);
                RayHit {
                    body: self
                        .colliders
                        .get(collider)
                        .and_then(|c| c.parent())
                        .map(BodyHandle),
                    point: Vec3::new(point.x, point.y, point.z),
                    distance: toi,
                }
            })
    }

    /// Bring the query structures up to date without stepping
    pub fn sync_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    /// Wireframe boxes around every collider
    pub fn debug_lines(&self) -> Vec<DebugLine> {
        let mut lines = Vec::with_capacity(self.colliders.len() * 12);
        for (_, collider) in self.colliders.iter() {
            let aabb = collider.compute_aabb();
            let (lo, hi) = (
                Vec3::new(aabb.mins.x, aabb.mins.y, aabb.mins.z),
                Vec3::new(aabb.maxs.x, aabb.maxs.y, aabb.maxs.z),
            );
            let sleeping = collider
                .parent()
                .and_then(|h| self.bodies.get(h))
                .map(|b| b.is_sleeping() || b.is_fixed())
                .unwrap_or(true);
            let color = if sleeping {
                Vec3::new(0.2, 0.8, 0.2)
            } else {
                Vec3::new(1.0, 1.0, 1.0)
            };
            let corner = |i: u8| {
                Vec3::new(
                    if i & 1 == 0 { lo.x } else { hi.x },
                    if i & 2 == 0 { lo.y } else { hi.y },
                    if i & 4 == 0 { lo.z } else { hi.z },
                )
            };
            for (a, b) in [
                (0, 1), (2, 3), (4, 5), (6, 7),
                (0, 2), (1, 3), (4, 6), (5, 7),
                (0, 4), (1, 5), (2, 6), (3, 7),
            ] {
                lines.push(DebugLine { from: corner(a), to: corner(b), color });
            }
        }
        lines
    }
}

fn groups(group: u32, mask: u32) -> rapier::InteractionGroups {
    rapier::InteractionGroups::new(
        rapier::Group::from_bits_truncate(group),
        rapier::Group::from_bits_truncate(mask),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn ball(physics: &mut PhysicsManager, pos: Vec3, mass: f32) -> PhysicsBody {
        physics.create_body(rapier::SharedShape::ball(0.5), ShapeKind::Sphere, mass, pos, Quat::IDENTITY)
    }

    fn hash_of(pair: &CollisionPair) -> u64 {
        let mut h = DefaultHasher::new();
        pair.hash(&mut h);
        h.finish()
    }

    #[test]
    fn test_collision_pair_canonical() {
        let mut physics = PhysicsManager::new();
        let a = ball(&mut physics, Vec3::ZERO, 1.0).handle();
        let b = ball(&mut physics, Vec3::X * 5.0, 1.0).handle();
        let ab = CollisionPair::new(a, b);
        let ba = CollisionPair::new(b, a);
        assert_eq!(ab, ba);
        assert_eq!(hash_of(&ab), hash_of(&ba));
        let mut set = HashSet::new();
        set.insert(ab);
        assert!(!set.insert(ba));
    }

    #[test]
    fn test_fixed_substeps() {
        let mut physics = PhysicsManager::new();
        assert_eq!(physics.step(PHYS_TIME_STEP * 0.5), 0);
        assert_eq!(physics.step(PHYS_TIME_STEP * 0.5), 1);
        assert_eq!(physics.step(1.0), PHYS_MAX_SUBSTEPS);
        // backlog beyond the cap is dropped
        assert!(physics.step(0.0) <= 1);
    }

    #[test]
    fn test_transform_roundtrip() {
        let mut physics = PhysicsManager::new();
        let body = ball(&mut physics, Vec3::new(1.0, 2.0, 3.0), 1.0);
        let m = physics.world_transform(body.handle()).unwrap();
        assert_relative_eq!(m.w_axis.x, 1.0);
        assert_relative_eq!(m.w_axis.y, 2.0);
        assert_relative_eq!(m.w_axis.z, 3.0);

        let rot = Quat::from_rotation_y(0.5);
        physics.set_transform(body.handle(), Vec3::new(-1.0, 0.0, 4.0), rot);
        let q = physics.rotation(body.handle()).unwrap();
        assert!(q.abs_diff_eq(rot, 1e-5) || q.abs_diff_eq(-rot, 1e-5));
        assert_relative_eq!(physics.translation(body.handle()).unwrap().z, 4.0);
    }

    #[test]
    fn test_collision_began_and_ended() {
        let mut physics = PhysicsManager::new();
        let floor = physics.create_body(
            rapier::SharedShape::cuboid(5.0, 0.5, 5.0),
            ShapeKind::Box,
            0.0,
            Vec3::ZERO,
            Quat::IDENTITY,
        );
        let mover = ball(&mut physics, Vec3::new(0.0, 0.9, 0.0), 1.0);
        physics.step(PHYS_TIME_STEP);
        let events = physics.take_collision_events();
        let pair = CollisionPair::new(floor.handle(), mover.handle());
        assert_eq!(events, vec![CollisionEvent::Began(pair)]);

        physics.set_transform(mover.handle(), Vec3::new(0.0, 10.0, 0.0), Quat::IDENTITY);
        physics.step(PHYS_TIME_STEP);
        assert_eq!(physics.take_collision_events(), vec![CollisionEvent::Ended(pair)]);
        assert!(physics.touching_pairs().is_empty());
    }

    #[test]
    fn test_cast_ray_hits_body() {
        let mut physics = PhysicsManager::new();
        let target = ball(&mut physics, Vec3::new(0.0, 0.0, -3.0), 0.0);
        physics.sync_queries();
        let hit = physics.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 10.0, None).unwrap();
        assert_eq!(hit.body, Some(target.handle()));
        assert_relative_eq!(hit.distance, 2.5, epsilon = 1e-4);
        assert!(physics.cast_ray(Vec3::ZERO, Vec3::Z, 10.0, None).is_none());
        assert!(physics.cast_ray(Vec3::ZERO, Vec3::NEG_Z, 1.0, None).is_none());
        assert!(physics
            .cast_ray(Vec3::ZERO, Vec3::NEG_Z, 10.0, Some(target.handle()))
            .is_none());
    }

    #[test]
    fn test_remove_body_removes_constraints_first() {
        let mut physics = PhysicsManager::new();
        let mut body = ball(&mut physics, Vec3::ZERO, 1.0);
        physics.set_global_angle_limit(&mut body, Vec3::ZERO, Vec3::ZERO);
        assert!(body.has_angle_limit());
        assert_eq!(physics.num_constraints(), 1);
        assert_eq!(physics.num_bodies(), 1);
        physics.remove_body(body);
        assert_eq!(physics.num_constraints(), 0);
        assert_eq!(physics.num_bodies(), 0);
    }

    #[test]
    fn test_capsule_uses_longest_axis() {
        let mesh = Mesh::cuboid(Vec3::new(0.25, 1.0, 0.5));
        let shape = shape_from_mesh(ShapeKind::Capsule, &mesh);
        let capsule = shape.as_capsule().unwrap();
        assert_relative_eq!(capsule.radius, 0.5);
        // height 2.0 minus both caps
        assert_relative_eq!(capsule.height(), 1.0);
    }

    #[test]
    fn test_sphere_and_cylinder_dimensions() {
        let mesh = Mesh::cuboid(Vec3::new(0.5, 1.5, 1.0));
        let ball = shape_from_mesh(ShapeKind::Sphere, &mesh);
        assert_relative_eq!(ball.as_ball().unwrap().radius, 1.5);
        let cyl = shape_from_mesh(ShapeKind::Cylinder, &mesh);
        let cyl = cyl.as_cylinder().unwrap();
        assert_relative_eq!(cyl.half_height, 1.5);
        assert_relative_eq!(cyl.radius, 0.75);
    }
}
