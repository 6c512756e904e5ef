use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Vec3, Vec4, Vec4Swizzles};
use tracing::{debug, info, trace, warn};

use crate::controller::physics::PhysicsManager;
use crate::controller::ShadowSlot;
use crate::error::Result;
use crate::model::assets::AssetStore;
use crate::model::camera::Camera;
use crate::model::camera_manager::CameraManager;
use crate::model::entity::{Entity, EntityId, EntityKind};
use crate::model::entity_manager::{EntityManager, Selection};
use crate::model::rotation::Rotation;
use crate::view::draw::{DrawSink, RenderTarget, ScopedPass};
use crate::view::shaders::{ShaderStore, DEPTH_SHADER};

/// Floats per light in the lighting buffer
pub const LIGHT_SIZE: usize = 24;
pub const MAX_LIGHTS: usize = 100;
/// Header (light count, repeated) plus every light slot
pub const LIGHT_BUFFER_LEN: usize = 4 + LIGHT_SIZE * MAX_LIGHTS;

pub const SHADOW_MAP_RES: u32 = 1024;
pub const MAX_SHADOW_LAYERS: u32 = 8;
pub const SHADOW_NEAR: f32 = 0.1;
pub const SHADOW_FAR: f32 = 20.0;
pub const SHADOW_FOV_DEG: f32 = 90.0;

static NEXT_LIGHT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LightId(u64);

impl LightId {
    pub(crate) fn next() -> Self {
        LightId(NEXT_LIGHT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightType {
    #[default]
    Point,
    Spot,
}

impl LightType {
    pub fn as_f32(self) -> f32 {
        match self {
            LightType::Point => 0.0,
            LightType::Spot => 1.0,
        }
    }

    pub fn from_f32(v: f32) -> Self {
        if v.round() as i32 == 1 {
            LightType::Spot
        } else {
            LightType::Point
        }
    }
}

/// Depth-pass state a light gets the first time it casts shadows
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowCaster {
    pub camera: String,
    pub layer: u32,
    pub do_not_draw: HashSet<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhongLight {
    id: LightId,
    pub pos: Vec4,
    pub a: Vec4,
    pub d: Vec4,
    pub s: Vec4,
    pub kind: LightType,
    pub dir: Vec3,
    /// Spot cone angle, radians
    pub spot_rads: f32,
    pub specular_exp: f32,
    pub falloff: f32,
    pub indicator: Option<EntityId>,
    pub cast_shadows: bool,
    shadow: Option<ShadowCaster>,
}

impl PhongLight {
    pub fn point(pos: Vec4, a: Vec4, d: Vec4, s: Vec4) -> Self {
        Self {
            id: LightId::next(),
            pos,
            a,
            d,
            s,
            kind: LightType::Point,
            dir: Vec3::Z,
            spot_rads: std::f32::consts::TAU,
            specular_exp: 100.0,
            falloff: 50.0,
            indicator: None,
            cast_shadows: false,
            shadow: None,
        }
    }

    pub fn spot(pos: Vec4, a: Vec4, d: Vec4, s: Vec4, dir: Vec3, spot_rads: f32) -> Self {
        Self {
            kind: LightType::Spot,
            dir,
            spot_rads,
            ..Self::point(pos, a, d, s)
        }
    }

    pub fn id(&self) -> LightId {
        self.id
    }

    pub fn position(&self) -> Vec3 {
        self.pos.xyz()
    }

    pub fn shadow(&self) -> Option<&ShadowCaster> {
        self.shadow.as_ref()
    }

    /// Shadow flag as the shader sees it
    pub fn shadow_active(&self) -> bool {
        self.cast_shadows && self.shadow.is_some()
    }

    fn write_slot(&self, out: &mut [f32]) {
        out[0..4].copy_from_slice(&self.pos.to_array());
        out[4..8].copy_from_slice(&self.a.to_array());
        out[8..12].copy_from_slice(&self.d.to_array());
        out[12..16].copy_from_slice(&self.s.to_array());
        out[16] = self.specular_exp;
        out[17] = self.falloff;
        out[18] = self.kind.as_f32();
        out[19] = if self.shadow_active() { 1.0 } else { 0.0 };
        out[20..23].copy_from_slice(&self.dir.to_array());
        out[23] = self.spot_rads;
    }
}

/// Indices of the `k` positions nearest to `from`, by squared distance.
///
/// Running selection: the first `k` fill the kept set, after which each
/// newcomer replaces the farthest kept entry if it is closer.
pub fn nearest_k(positions: &[Vec3], from: Vec3, k: usize) -> Vec<usize> {
    let mut kept: Vec<(usize, f32)> = Vec::with_capacity(k.min(positions.len()));
    if k == 0 {
        return Vec::new();
    }
    for (i, p) in positions.iter().enumerate() {
        let dist2 = from.distance_squared(*p);
        if kept.len() < k {
            kept.push((i, dist2));
            continue;
        }
        let (far_slot, far_dist) = kept
            .iter()
            .enumerate()
            .map(|(slot, &(_, d))| (slot, d))
            .fold((0, f32::MIN), |acc, x| if x.1 > acc.1 { x } else { acc });
        if dist2 < far_dist {
            kept[far_slot] = (i, dist2);
        }
    }
    kept.into_iter().map(|(i, _)| i).collect()
}

/// Phong lights, their shadow casters and the flat buffer fed to shaders
#[derive(Debug)]
pub struct LightingManager {
    lights: Vec<PhongLight>,
    buffer: Vec<f32>,
    shadow_slots: Vec<ShadowSlot>,
    free_layers: Vec<u32>,
}

impl Default for LightingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LightingManager {
    pub fn new() -> Self {
        Self {
            lights: Vec::new(),
            buffer: vec![0.0; LIGHT_BUFFER_LEN],
            shadow_slots: Vec::new(),
            free_layers: (0..MAX_SHADOW_LAYERS).rev().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn lights(&self) -> &[PhongLight] {
        &self.lights
    }

    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    pub fn shadow_slots(&self) -> &[ShadowSlot] {
        &self.shadow_slots
    }

    /// Lighting data in the shape `ShaderStore::swap_shader` publishes
    pub fn publishable(&self) -> (&[f32], &[ShadowSlot]) {
        (&self.buffer, &self.shadow_slots)
    }

    pub fn add(&mut self, light: PhongLight) -> LightId {
        let id = light.id;
        self.lights.push(light);
        id
    }

    /// Add a light together with a light-indicator entity at its position
    pub fn add_with_indicator(
        &mut self,
        mut light: PhongLight,
        entities: &mut EntityManager,
        assets: &mut AssetStore,
        physics: &mut PhysicsManager,
        editor: bool,
    ) -> LightId {
        let indicator = Entity::spawn(
            EntityKind::LightIndicator,
            light.position(),
            Rotation::IDENTITY,
            assets,
            physics,
            editor,
        );
        light.indicator = Some(entities.add(indicator));
        info!(pos = ?light.position(), "added light");
        self.add(light)
    }

    pub fn get(&self, id: LightId) -> Option<&PhongLight> {
        self.lights.iter().find(|l| l.id == id)
    }

    pub fn get_mut(&mut self, id: LightId) -> Option<&mut PhongLight> {
        self.lights.iter_mut().find(|l| l.id == id)
    }

    pub fn get_by_indicator(&self, entity: EntityId) -> Option<LightId> {
        self.lights
            .iter()
            .find(|l| l.indicator == Some(entity))
            .map(|l| l.id)
    }

    pub fn indicators(&self) -> HashSet<EntityId> {
        self.lights.iter().filter_map(|l| l.indicator).collect()
    }

    /// Move a light and its indicator
    pub fn set_position(
        &mut self,
        id: LightId,
        pos: Vec3,
        entities: &mut EntityManager,
        physics: &mut PhysicsManager,
    ) -> bool {
        let Some(light) = self.get_mut(id) else {
            return false;
        };
        light.pos = pos.extend(light.pos.w);
        if let Some(indicator) = light.indicator.and_then(|i| entities.get_mut(i)) {
            indicator.translate(pos, physics);
        }
        true
    }

    /// Remove a light. Its indicator entity and shadow camera go with it.
    pub fn evict(
        &mut self,
        id: LightId,
        entities: &mut EntityManager,
        cameras: &mut CameraManager,
        physics: &mut PhysicsManager,
        selection: &mut Selection,
    ) -> bool {
        let Some(idx) = self.lights.iter().position(|l| l.id == id) else {
            return false;
        };
        let light = self.lights.remove(idx);
        self.release(light, entities, cameras, physics, selection);
        true
    }

    fn release(
        &mut self,
        light: PhongLight,
        entities: &mut EntityManager,
        cameras: &mut CameraManager,
        physics: &mut PhysicsManager,
        selection: &mut Selection,
    ) {
        if let Some(indicator) = light.indicator {
            entities.evict(indicator, physics, selection);
        }
        if let Some(shadow) = light.shadow {
            cameras.evict(&shadow.camera);
            self.free_layers.push(shadow.layer);
        }
        if selection.light == Some(light.id) {
            selection.forget_light();
        }
        debug!(id = %light.id, "removed light");
    }

    pub fn clear(
        &mut self,
        entities: &mut EntityManager,
        cameras: &mut CameraManager,
        physics: &mut PhysicsManager,
        selection: &mut Selection,
    ) {
        for light in std::mem::take(&mut self.lights) {
            self.release(light, entities, cameras, physics, selection);
        }
        self.shadow_slots.clear();
        self.buffer.fill(0.0);
    }

    /// Turn shadows on for a light, creating its depth layer and camera the
    /// first time. Returns false for an unknown light or when every shadow
    /// layer is taken.
    pub fn make_shadow_caster(
        &mut self,
        id: LightId,
        cameras: &mut CameraManager,
        entities: &EntityManager,
        physics: &PhysicsManager,
    ) -> bool {
        let Some(idx) = self.lights.iter().position(|l| l.id == id) else {
            return false;
        };
        self.lights[idx].cast_shadows = true;
        if self.lights[idx].shadow.is_some() {
            return true;
        }
        let Some(layer) = self.free_layers.pop() else {
            warn!(%id, "no free shadow map layer");
            return false;
        };

        let light = &mut self.lights[idx];
        let name = format!("light_{}_shadow", id);
        let camera = cameras.add(
            &name,
            Some(Camera::new(SHADOW_NEAR, SHADOW_FAR, SHADOW_FOV_DEG, 1.0)),
        );
        camera.set_eye(light.position());
        if light.kind == LightType::Spot {
            camera.look_at(light.position() + light.dir);
        }
        camera.bind(light.indicator);
        camera.update_cam_pos(entities, physics);

        light.shadow = Some(ShadowCaster {
            camera: name,
            layer,
            do_not_draw: light.indicator.into_iter().collect(),
        });
        info!(%id, layer, "light now casts shadows");
        true
    }

    /// Per-frame refresh: indicators, shadow cameras, nearest-K selection
    /// and the lighting buffer. Without an active camera the buffer is left
    /// as it was.
    pub fn update(
        &mut self,
        entities: &mut EntityManager,
        physics: &PhysicsManager,
        cameras: &mut CameraManager,
    ) {
        for light in self.lights.iter_mut() {
            let Some(indicator) = light.indicator.and_then(|i| entities.get_mut(i)) else {
                continue;
            };
            indicator.update(physics);
            light.pos = indicator.cur_center().extend(light.pos.w);
        }

        for light in self.lights.iter() {
            if let Some(camera) = light.shadow.as_ref().and_then(|s| cameras.get_mut(&s.camera)) {
                if light.kind == LightType::Spot {
                    camera.look_at(camera.eye() + light.dir);
                }
                camera.update_cam_pos(entities, physics);
            }
        }

        let Some(eye) = cameras.active().map(Camera::eye) else {
            return;
        };
        let positions: Vec<Vec3> = self.lights.iter().map(PhongLight::position).collect();
        let selected = nearest_k(&positions, eye, MAX_LIGHTS);

        self.buffer.fill(0.0);
        self.shadow_slots.clear();
        for (slot, &i) in selected.iter().enumerate() {
            let light = &self.lights[i];
            let offset = 4 + slot * LIGHT_SIZE;
            light.write_slot(&mut self.buffer[offset..offset + LIGHT_SIZE]);

            let shadow = light
                .shadow
                .as_ref()
                .filter(|_| light.cast_shadows)
                .and_then(|s| cameras.get(&s.camera).map(|c| (s.layer, c.view_proj())));
            self.shadow_slots.push(match shadow {
                Some((layer, view_proj)) => ShadowSlot {
                    view_proj: view_proj.to_cols_array_2d(),
                    layer: [layer as f32, 0.0, 0.0, 0.0],
                },
                None => ShadowSlot {
                    view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
                    layer: [-1.0, 0.0, 0.0, 0.0],
                },
            });
        }
        let count = selected.len() as f32;
        self.buffer[0..4].fill(count);
        trace!(count, "lighting buffer written");
    }

    /// Render one light's shadow map. The active camera and current shader
    /// are restored afterwards, even if a draw fails.
    pub fn draw_shadow_pass(
        &self,
        id: LightId,
        entities: &EntityManager,
        physics: &PhysicsManager,
        cameras: &mut CameraManager,
        shaders: &mut ShaderStore,
        sink: &mut dyn DrawSink,
    ) -> Result<()> {
        let Some(shadow) = self.get(id).and_then(|l| l.shadow.as_ref()) else {
            return Ok(());
        };
        let mut pass = ScopedPass::new(cameras, shaders);
        if !pass.switch_camera(&shadow.camera, entities, physics) {
            return Ok(());
        }
        sink.begin_target(RenderTarget::ShadowLayer(shadow.layer))?;
        pass.swap_shader(DEPTH_SHADER, self.publishable(), sink)?;
        let cameras = pass.cameras();
        let drawn = entities.try_for_each(true, &mut |e: &Entity| {
            if shadow.do_not_draw.contains(&e.id()) {
                return Ok(());
            }
            e.draw(cameras, sink)
        });
        drawn
    }

    /// Depth passes for every shadow-casting light
    pub fn draw_shadows(
        &self,
        entities: &EntityManager,
        physics: &PhysicsManager,
        cameras: &mut CameraManager,
        shaders: &mut ShaderStore,
        sink: &mut dyn DrawSink,
    ) -> Result<()> {
        for light in self.lights.iter().filter(|l| l.shadow_active()) {
            self.draw_shadow_pass(light.id, entities, physics, cameras, shaders, sink)?;
        }
        Ok(())
    }

    /// Draw the light indicator entities
    pub fn draw(
        &self,
        entities: &EntityManager,
        cameras: &CameraManager,
        sink: &mut dyn DrawSink,
    ) -> Result<()> {
        for indicator in self.lights.iter().filter_map(|l| l.indicator) {
            if let Some(entity) = entities.get(indicator) {
                entity.draw(cameras, sink)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::physics::DebugLine;
    use crate::controller::{CameraUniform, WorldUniform};
    use crate::error::EngineError;
    use crate::model::entity::test_assets;
    use crate::view::draw::{CommandRecorder, DrawCommand, MeshDraw};
    use crate::view::shaders::{ShaderKind, NORMAL_SHADER};

    struct World {
        assets: AssetStore,
        physics: PhysicsManager,
        entities: EntityManager,
        cameras: CameraManager,
        shaders: ShaderStore,
        lighting: LightingManager,
    }

    fn world() -> World {
        let mut w = World {
            assets: test_assets(),
            physics: PhysicsManager::new(),
            entities: EntityManager::new(),
            cameras: CameraManager::new(),
            shaders: ShaderStore::new(),
            lighting: LightingManager::new(),
        };
        w.cameras
            .add("cam_normal", Some(Camera::new(0.1, 1000.0, 50.625, 16.0 / 9.0)))
            .set_eye(Vec3::new(0.0, 1.0, 4.0));
        w.cameras.switch("cam_normal", &w.entities, &w.physics);
        w.entities.add_by_type(
            "u_c_toolbox",
            Vec3::new(0.0, 0.0, -1.0),
            Rotation::IDENTITY,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        w
    }

    fn white_light(pos: Vec3) -> PhongLight {
        PhongLight::point(pos.extend(1.0), Vec4::splat(0.1), Vec4::ONE, Vec4::ONE)
    }

    #[test]
    fn test_nearest_k_keeps_closest() {
        let positions = [
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let mut picked = nearest_k(&positions, Vec3::ZERO, 2);
        picked.sort();
        assert_eq!(picked, vec![1, 3]);
        assert_eq!(nearest_k(&positions, Vec3::ZERO, 10).len(), 4);
        assert!(nearest_k(&positions, Vec3::ZERO, 0).is_empty());
    }

    #[test]
    fn test_buffer_layout() {
        let mut w = world();
        let mut light = PhongLight::spot(
            Vec4::new(1.0, 2.0, 3.0, 1.0),
            Vec4::splat(0.1),
            Vec4::splat(0.8),
            Vec4::splat(0.5),
            Vec3::new(0.0, -1.0, 0.0),
            0.7,
        );
        light.specular_exp = 32.0;
        light.falloff = 12.0;
        w.lighting.add(light);
        w.lighting.update(&mut w.entities, &w.physics, &mut w.cameras);

        let buf = w.lighting.buffer();
        assert_eq!(buf.len(), LIGHT_BUFFER_LEN);
        assert_eq!(&buf[0..4], &[1.0; 4]);
        assert_eq!(&buf[4..8], &[1.0, 2.0, 3.0, 1.0]);
        assert_eq!(buf[4 + 16], 32.0);
        assert_eq!(buf[4 + 17], 12.0);
        assert_eq!(buf[4 + 18], 1.0);
        assert_eq!(buf[4 + 19], 0.0);
        assert_eq!(&buf[4 + 20..4 + 23], &[0.0, -1.0, 0.0]);
        assert_eq!(buf[4 + 23], 0.7);
        assert_eq!(w.lighting.shadow_slots().len(), 1);
    }

    #[test]
    fn test_shadow_flag_needs_caster() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::new(0.0, 3.0, 0.0)),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        w.lighting.get_mut(id).unwrap().cast_shadows = true;
        w.lighting.update(&mut w.entities, &w.physics, &mut w.cameras);
        assert_eq!(w.lighting.buffer()[4 + 19], 0.0);

        assert!(w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics));
        w.lighting.update(&mut w.entities, &w.physics, &mut w.cameras);
        assert_eq!(w.lighting.buffer()[4 + 19], 1.0);
        assert_eq!(w.lighting.shadow_slots()[0].layer[0], (MAX_SHADOW_LAYERS - 1) as f32);
    }

    #[test]
    fn test_make_shadow_caster_is_idempotent() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::new(1.0, 2.0, 0.0)),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        assert!(w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics));
        let first = w.lighting.get(id).unwrap().shadow().cloned().unwrap();
        let cams = w.cameras.len();
        assert!(w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics));
        assert_eq!(w.lighting.get(id).unwrap().shadow(), Some(&first));
        assert_eq!(w.cameras.len(), cams);

        let indicator = w.lighting.get(id).unwrap().indicator.unwrap();
        assert!(first.do_not_draw.contains(&indicator));
        let shadow_cam = w.cameras.get(&first.camera).unwrap();
        assert_eq!(shadow_cam.bound_entity(), Some(indicator));
        assert!(shadow_cam.eye().abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
    }

    #[test]
    fn test_depth_pass_restores_camera_and_shader() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::new(0.0, 3.0, 0.0)),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics);
        let mut rec = CommandRecorder::new();
        w.shaders
            .swap_shader(NORMAL_SHADER, &w.cameras, w.lighting.publishable(), &mut rec)
            .unwrap();

        let cam_before = w.cameras.active_name().map(str::to_string);
        let view_before = w.cameras.active().unwrap().view_matrix();
        let shader_before = w.shaders.current().map(str::to_string);

        rec.clear();
        w.lighting
            .draw_shadow_pass(id, &w.entities, &w.physics, &mut w.cameras, &mut w.shaders, &mut rec)
            .unwrap();

        assert_eq!(w.cameras.active_name().map(str::to_string), cam_before);
        assert_eq!(w.cameras.active().unwrap().view_matrix(), view_before);
        assert_eq!(w.shaders.current().map(str::to_string), shader_before);

        let cmds = rec.commands();
        assert!(matches!(cmds[0], DrawCommand::Target(RenderTarget::ShadowLayer(_))));
        assert!(matches!(cmds[1], DrawCommand::Shader(ShaderKind::Depth)));
        // toolbox drawn, indicator excluded
        assert_eq!(rec.mesh_draws().count(), 1);
    }

    struct FailingSink;

    impl DrawSink for FailingSink {
        fn begin_target(&mut self, _: RenderTarget) -> Result<()> {
            Ok(())
        }
        fn use_shader(&mut self, _: ShaderKind) -> Result<()> {
            Ok(())
        }
        fn publish_world(&mut self, _: WorldUniform) -> Result<()> {
            Ok(())
        }
        fn publish_camera(&mut self, _: CameraUniform) -> Result<()> {
            Ok(())
        }
        fn publish_lighting(&mut self, _: &[f32], _: &[ShadowSlot]) -> Result<()> {
            Ok(())
        }
        fn draw_mesh(&mut self, _: MeshDraw) -> Result<()> {
            Err(EngineError::SurfaceLost)
        }
        fn draw_lines(&mut self, _: &[DebugLine]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_depth_pass_still_restores() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::new(0.0, 3.0, 0.0)),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics);
        w.shaders.restore_current(Some(NORMAL_SHADER.to_string()));

        let result = w.lighting.draw_shadow_pass(
            id,
            &w.entities,
            &w.physics,
            &mut w.cameras,
            &mut w.shaders,
            &mut FailingSink,
        );
        assert!(result.is_err());
        assert_eq!(w.cameras.active_name(), Some("cam_normal"));
        assert_eq!(w.shaders.current(), Some(NORMAL_SHADER));
    }

    #[test]
    fn test_evict_removes_indicator_and_camera() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::new(0.0, 3.0, 0.0)),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics);
        let indicator = w.lighting.get(id).unwrap().indicator.unwrap();
        assert_eq!(w.lighting.get_by_indicator(indicator), Some(id));
        let camera = w.lighting.get(id).unwrap().shadow().unwrap().camera.clone();

        let mut selection = Selection::default();
        selection.select_light(id, Some(indicator));
        assert!(w.lighting.evict(id, &mut w.entities, &mut w.cameras, &mut w.physics, &mut selection));
        assert!(w.entities.get(indicator).is_none());
        assert!(!w.cameras.contains(&camera));
        assert_eq!(selection.light, None);
        assert_eq!(w.cameras.active_name(), Some("cam_normal"));

        // the freed layer is handed out again
        let again = w.lighting.add(white_light(Vec3::ZERO));
        w.lighting.make_shadow_caster(again, &mut w.cameras, &w.entities, &w.physics);
        assert_eq!(
            w.lighting.get(again).unwrap().shadow().unwrap().layer,
            MAX_SHADOW_LAYERS - 1
        );
    }

    #[test]
    fn test_light_follows_moved_indicator() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::ZERO),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        assert!(w.lighting.set_position(id, Vec3::new(2.0, 0.0, 0.0), &mut w.entities, &mut w.physics));
        w.lighting.update(&mut w.entities, &w.physics, &mut w.cameras);
        assert!(w.lighting.get(id).unwrap().position().abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-5));
        assert_eq!(&w.lighting.buffer()[4..7], &[2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_spot_shadow_camera_follows_direction() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            PhongLight::spot(
                Vec4::new(0.0, 3.0, 0.0, 1.0),
                Vec4::splat(0.1),
                Vec4::ONE,
                Vec4::ONE,
                Vec3::new(0.0, -1.0, 0.0),
                0.5,
            ),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        assert!(w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics));
        let cam_name = w.lighting.get(id).unwrap().shadow().unwrap().camera.clone();
        assert!(w
            .cameras
            .get(&cam_name)
            .unwrap()
            .forward()
            .abs_diff_eq(Vec3::new(0.0, -1.0, 0.0), 1e-4));

        w.lighting.get_mut(id).unwrap().dir = Vec3::X;
        w.lighting.update(&mut w.entities, &w.physics, &mut w.cameras);
        let forward = w.cameras.get(&cam_name).unwrap().forward();
        assert!(forward.abs_diff_eq(Vec3::X, 1e-4), "shadow camera faces {forward:?}");
    }

    #[test]
    fn test_point_turned_spot_aims_shadow_camera() {
        let mut w = world();
        let id = w.lighting.add_with_indicator(
            white_light(Vec3::new(0.0, 3.0, 0.0)),
            &mut w.entities,
            &mut w.assets,
            &mut w.physics,
            false,
        );
        assert!(w.lighting.make_shadow_caster(id, &mut w.cameras, &w.entities, &w.physics));
        {
            let light = w.lighting.get_mut(id).unwrap();
            light.kind = LightType::Spot;
            light.dir = Vec3::new(0.0, 0.0, 1.0);
        }
        w.lighting.update(&mut w.entities, &w.physics, &mut w.cameras);
        let cam_name = w.lighting.get(id).unwrap().shadow().unwrap().camera.clone();
        let forward = w.cameras.get(&cam_name).unwrap().forward();
        assert!(forward.abs_diff_eq(Vec3::Z, 1e-4), "shadow camera faces {forward:?}");
    }
}
