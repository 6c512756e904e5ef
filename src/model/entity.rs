use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec3};
use tracing::{debug, error, warn};

use crate::controller::physics::{
    shape_from_mesh, BodyHandle, PhysicsBody, PhysicsManager, ShapeKind, ShapeSpec,
};
use crate::error::{EngineError, Result};
use crate::model::assets::AssetStore;
use crate::model::camera_manager::CameraManager;
use crate::model::rotation::Rotation;
use crate::model::script::{self, Script, ScriptContext};
use crate::utils::Mesh;
use crate::view::draw::{DrawSink, MeshDraw};

pub const DEFAULT_MASS: f32 = 1.0;
pub const DEFAULT_MAX_VELOCITY: f32 = 20.0;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle to an entity owned by an [`EntityManager`](super::EntityManager)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    fn next() -> Self {
        EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Known entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Flowerpot,
    TestTerrain,
    PlayerMesh,
    LightIndicator,
    Microscope,
    Circuit1,
    Toolbox,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Flowerpot,
        EntityKind::TestTerrain,
        EntityKind::PlayerMesh,
        EntityKind::LightIndicator,
        EntityKind::Microscope,
        EntityKind::Circuit1,
        EntityKind::Toolbox,
    ];

    pub fn from_type_str(type_str: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_str() == type_str)
    }

    /// Parse a type string, erroring on unknown types
    pub fn parse(type_str: &str) -> Result<Self> {
        Self::from_type_str(type_str)
            .ok_or_else(|| EngineError::UnknownEntityType(type_str.to_string()))
    }

    pub fn type_str(self) -> &'static str {
        match self {
            EntityKind::Flowerpot => "u_flowerpot",
            EntityKind::TestTerrain => "u_test_terrain",
            EntityKind::PlayerMesh => "u_player_mesh",
            EntityKind::LightIndicator => "u_light_ind",
            EntityKind::Microscope => "u_c_microscope",
            EntityKind::Circuit1 => "u_c_circuit_1",
            EntityKind::Toolbox => "u_c_toolbox",
        }
    }

    fn asset_name(self) -> &'static str {
        match self {
            EntityKind::Flowerpot => "flowerpot",
            EntityKind::TestTerrain => "test_terrain_2",
            EntityKind::PlayerMesh => "player_mesh",
            EntityKind::LightIndicator => "light_ind",
            EntityKind::Microscope => "c_microscope",
            EntityKind::Circuit1 => "c_circuit_1",
            EntityKind::Toolbox => "c_toolbox",
        }
    }

    pub fn mesh_path(self) -> String {
        format!("meshes/{}.obj", self.asset_name())
    }

    pub fn texture_path(self) -> String {
        format!("textures/png/{}.png", self.asset_name())
    }

    pub fn shape(self) -> ShapeSpec {
        match self {
            EntityKind::Flowerpot => ShapeSpec::dynamic(ShapeKind::Cylinder),
            EntityKind::TestTerrain => ShapeSpec::fixed(ShapeKind::TriMesh),
            EntityKind::PlayerMesh => ShapeSpec::dynamic(ShapeKind::Capsule),
            EntityKind::LightIndicator => ShapeSpec::fixed(ShapeKind::Sphere),
            EntityKind::Microscope | EntityKind::Circuit1 | EntityKind::Toolbox => {
                ShapeSpec::dynamic(ShapeKind::Box)
            }
        }
    }
}

/// Who owns an entity's placement
#[derive(Debug)]
pub enum EntityTransform {
    /// The rigid body is authoritative
    Kinematic { body: PhysicsBody },
    /// Pure data, no simulation
    Static { transform: Mat4 },
}

/// Scene entity ("unity")
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    pub name: String,
    mesh: Option<Arc<Mesh>>,
    texture: Option<String>,
    placement: EntityTransform,
    render_transform: Mat4,
    cur_center: Vec3,
    cur_scale: Vec3,
    rotation: Rotation,
    scripts: Vec<Box<dyn Script>>,
    use_script: Option<usize>,
    pub max_velocity: f32,
}

impl Entity {
    /// Build an entity of `kind` at `pos`: load its assets, derive a
    /// collision shape from the mesh bounds and create the rigid body.
    /// Editor mode makes every body immobile.
    pub fn spawn(
        kind: EntityKind,
        pos: Vec3,
        rot: Rotation,
        assets: &mut AssetStore,
        physics: &mut PhysicsManager,
        editor: bool,
    ) -> Self {
        let texture_path = kind.texture_path();
        let texture = assets.texture(&texture_path).map(|_| texture_path);
        let mesh = assets.mesh(&kind.mesh_path());

        let spec = kind.shape();
        let mass = if spec.immobile || editor { 0.0 } else { DEFAULT_MASS };

        let placement = match &mesh {
            Some(m) => {
                let shape = shape_from_mesh(spec.kind, m);
                EntityTransform::Kinematic {
                    body: physics.create_body(shape, spec.kind, mass, pos, rot.quat()),
                }
            }
            None => {
                error!("{} has no mesh, creating it without a physics body", kind.type_str());
                EntityTransform::Static {
                    transform: Mat4::from_rotation_translation(rot.quat(), pos),
                }
            }
        };

        let mut entity = Self {
            id: EntityId::next(),
            kind,
            name: String::new(),
            mesh,
            texture,
            placement,
            render_transform: Mat4::IDENTITY,
            cur_center: Vec3::ZERO,
            cur_scale: Vec3::ONE,
            rotation: rot,
            scripts: Vec::new(),
            use_script: None,
            max_velocity: DEFAULT_MAX_VELOCITY,
        };
        entity.update(physics);
        debug!(id = ?entity.id, kind = kind.type_str(), ?pos, "spawned entity");
        entity
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn type_str(&self) -> &'static str {
        self.kind.type_str()
    }

    pub fn mesh(&self) -> Option<&Arc<Mesh>> {
        self.mesh.as_ref()
    }

    pub fn texture(&self) -> Option<&str> {
        self.texture.as_deref()
    }

    pub fn placement(&self) -> &EntityTransform {
        &self.placement
    }

    pub fn body(&self) -> Option<&PhysicsBody> {
        match &self.placement {
            EntityTransform::Kinematic { body } => Some(body),
            EntityTransform::Static { .. } => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut PhysicsBody> {
        match &mut self.placement {
            EntityTransform::Kinematic { body } => Some(body),
            EntityTransform::Static { .. } => None,
        }
    }

    pub fn body_handle(&self) -> Option<BodyHandle> {
        self.body().map(PhysicsBody::handle)
    }

    pub fn render_transform(&self) -> Mat4 {
        self.render_transform
    }

    pub fn cur_center(&self) -> Vec3 {
        self.cur_center
    }

    pub fn cur_scale(&self) -> Vec3 {
        self.cur_scale
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    // ==================== Scripts ====================

    pub fn scripts(&self) -> &[Box<dyn Script>] {
        &self.scripts
    }

    pub fn scripts_mut(&mut self) -> &mut [Box<dyn Script>] {
        &mut self.scripts
    }

    pub fn add_script(&mut self, script: Box<dyn Script>) -> usize {
        script::log_attached(self.kind.type_str(), script.as_ref());
        self.scripts.push(script);
        self.scripts.len() - 1
    }

    pub fn use_script_index(&self) -> Option<usize> {
        self.use_script
    }

    /// Mark script `index` as the on-use script. Out-of-range indices are ignored.
    pub fn set_use_script(&mut self, index: usize) -> bool {
        if index >= self.scripts.len() {
            warn!(index, "no script at index to use");
            return false;
        }
        self.use_script = Some(index);
        true
    }

    /// Fire the on-use script. Returns false when there is none.
    pub fn use_entity(&mut self, ctx: &mut ScriptContext<'_>) -> bool {
        match self.use_script.and_then(|i| self.scripts.get_mut(i)) {
            Some(s) => {
                s.call(0.0, ctx);
                true
            }
            None => false,
        }
    }

    /// Per-frame scripts, the on-use one excluded
    pub fn run_scripts(&mut self, dt: f32, ctx: &mut ScriptContext<'_>) {
        script::run_scripts(&mut self.scripts, self.use_script, dt, ctx);
    }

    // ==================== Transform ====================

    /// Pull the render transform and center back out of the physics body
    pub fn update(&mut self, physics: &PhysicsManager) {
        match &self.placement {
            EntityTransform::Kinematic { body } => {
                let Some(transform) = physics.world_transform(body.handle()) else {
                    return;
                };
                self.render_transform = transform;
                self.cur_center = transform.w_axis.truncate();
                if let Some(q) = physics.rotation(body.handle()) {
                    self.rotation = Rotation::from_quat(q);
                }
            }
            EntityTransform::Static { transform } => {
                self.render_transform = *transform;
                self.cur_center = transform.w_axis.truncate();
            }
        }
    }

    fn place(&mut self, pos: Vec3, rot: Rotation, physics: &mut PhysicsManager) {
        match &mut self.placement {
            EntityTransform::Kinematic { body } => physics.set_transform(body.handle(), pos, rot.quat()),
            EntityTransform::Static { transform } => {
                *transform = Mat4::from_rotation_translation(rot.quat(), pos);
            }
        }
        self.rotation = rot;
        self.update(physics);
    }

    /// Move to an absolute position, keeping the orientation
    pub fn translate(&mut self, pos: Vec3, physics: &mut PhysicsManager) {
        self.place(pos, self.rotation, physics);
    }

    pub fn move_by(&mut self, delta: Vec3, physics: &mut PhysicsManager) {
        self.translate(self.cur_center + delta, physics);
    }

    /// Replace the orientation, keeping the position
    pub fn set_rotation(&mut self, rot: Rotation, physics: &mut PhysicsManager) {
        self.place(self.cur_center, rot, physics);
    }

    pub fn rotate_by(&mut self, delta: Rotation, physics: &mut PhysicsManager) {
        self.set_rotation(delta * self.rotation, physics);
    }

    /// Rescale to `new_scale` by the ratio against the current scale. The mesh
    /// is rescaled in place and the collision shape rebuilt from it.
    pub fn scale(&mut self, new_scale: Vec3, physics: &mut PhysicsManager) -> bool {
        if !new_scale.is_finite() || new_scale.cmpeq(Vec3::ZERO).any() {
            warn!(?new_scale, "rejecting degenerate scale");
            return false;
        }
        let ratio = new_scale / self.cur_scale;
        if let Some(mesh) = self.mesh.as_mut() {
            Arc::make_mut(mesh).scale_by(ratio);
            if let EntityTransform::Kinematic { body } = &self.placement {
                physics.set_shape(body, shape_from_mesh(body.kind(), &**mesh));
            }
        }
        self.cur_scale = new_scale;
        self.update(physics);
        true
    }

    // ==================== Velocity ====================

    /// Add `dv` to the body's velocity, capped at `max_velocity`
    pub fn dv(&mut self, dv: Vec3, physics: &mut PhysicsManager) {
        if let Some(handle) = self.body_handle() {
            let v = physics.linear_velocity(handle) + dv;
            physics.set_linear_velocity(handle, v.clamp_length_max(self.max_velocity));
        }
    }

    pub fn set_velocity(&mut self, v: Vec3, physics: &mut PhysicsManager) {
        if let Some(handle) = self.body_handle() {
            physics.set_linear_velocity(handle, v.clamp_length_max(self.max_velocity));
        }
    }

    pub fn velocity(&self, physics: &PhysicsManager) -> Vec3 {
        self.body_handle()
            .map(|h| physics.linear_velocity(h))
            .unwrap_or(Vec3::ZERO)
    }

    // ==================== Lifecycle ====================

    /// Record a draw of this entity. Does nothing without an active camera.
    pub fn draw(&self, cameras: &CameraManager, sink: &mut dyn DrawSink) -> Result<()> {
        if cameras.active().is_none() {
            return Ok(());
        }
        let Some(mesh) = &self.mesh else {
            return Ok(());
        };
        sink.draw_mesh(MeshDraw {
            transform: self.render_transform,
            mesh: Arc::clone(mesh),
            texture: self.texture.clone(),
        })
    }

    /// Tear down: the body leaves the simulation before anything else goes
    pub fn destroy(self, physics: &mut PhysicsManager) {
        let Entity { id, placement, .. } = self;
        if let EntityTransform::Kinematic { body } = placement {
            physics.remove_body(body);
        }
        debug!(?id, "destroyed entity");
    }
}

/// Asset store with procedural meshes for every entity type
#[cfg(test)]
pub(crate) fn test_assets() -> AssetStore {
    let mut assets = AssetStore::new("/nonexistent-asset-root");
    for kind in EntityKind::ALL {
        let mesh = match kind.shape().kind {
            ShapeKind::Cylinder => Mesh::cylinder(0.25, 0.5, 16),
            ShapeKind::Sphere => Mesh::uv_sphere(0.1, 8, 8),
            ShapeKind::Capsule => Mesh::cuboid(Vec3::new(0.3, 0.9, 0.3)),
            _ => Mesh::cuboid(Vec3::splat(0.5)),
        };
        assets.insert_mesh(kind.mesh_path(), mesh);
    }
    assets
}
