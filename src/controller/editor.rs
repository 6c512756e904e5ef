use std::collections::HashSet;
use std::path::PathBuf;

use glam::{Vec3, Vec4};
use tracing::{error, info, warn};

use crate::controller::physics::PhysicsManager;
use crate::error::Result;
use crate::model::script;
use crate::model::{
    AssetStore, CameraManager, EntityId, EntityManager, LightType, LightingManager, PhongLight,
    Rotation, SceneFile, Selection,
};
use crate::utils::parse_float;

/// New entities and lights appear this far in front of the camera
pub const SPAWN_OFFSET: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightChannel {
    Ambient,
    Diffuse,
    Specular,
}

/// Which part of an axis-angle rotation a field edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationField {
    /// Angle in degrees
    Angle,
    Axis(Axis),
}

/// One editor request. Numeric fields carry the raw text the user typed;
/// text that does not parse turns the action into a logged no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorAction {
    AddEntity { type_name: String },
    ClearSelection,
    SetEntityPosition { axis: Axis, value: String },
    SetEntityRotation { field: RotationField, value: String },
    /// Rotate by `degrees` about the entity's current axis
    RotateEntity { degrees: String },
    SetEntityScale { axis: Axis, value: String },
    RenameEntity { name: String },
    DeleteEntity,
    AddScript { type_name: String },
    SetUseScript { index: usize },
    SetScriptText { index: usize, text: String },
    LoadScriptText { index: usize, path: PathBuf },

    AddLight,
    DeleteLight,
    SetLightPosition { axis: Axis, value: String },
    /// `component` 0..4 is r, g, b, a
    SetLightColor { channel: LightChannel, component: usize, value: String },
    SetSpecularExp { value: String },
    SetFalloff { value: String },
    SetLightType { kind: LightType },
    SetSpotDirection { axis: Axis, value: String },
    /// Degrees; stored as radians
    SetSpotAngle { degrees: String },
    ToggleShadows,

    SaveScene { path: PathBuf },
}

/// World state an editor action may change
pub struct EditorContext<'a> {
    pub entities: &'a mut EntityManager,
    pub lighting: &'a mut LightingManager,
    pub cameras: &'a mut CameraManager,
    pub physics: &'a mut PhysicsManager,
    pub assets: &'a mut AssetStore,
    pub selection: &'a mut Selection,
    pub editor: bool,
    /// Entities excluded from saved scenes
    pub keep: &'a HashSet<EntityId>,
}

fn number(text: &str, what: &str) -> Option<f32> {
    let v = parse_float(text);
    if v.is_nan() {
        warn!("{} is not a number, ignoring", what);
        None
    } else {
        Some(v)
    }
}

fn with_axis(mut v: Vec3, axis: Axis, value: f32) -> Vec3 {
    v[axis.index()] = value;
    v
}

impl EditorContext<'_> {
    fn spawn_point(&self) -> Option<Vec3> {
        self.cameras
            .active()
            .map(|cam| cam.eye() + cam.forward() * SPAWN_OFFSET)
    }
}

impl EditorAction {
    /// Apply the action. Returns false when it had nothing to act on or was
    /// rejected; only saving can fail outright.
    pub fn apply(&self, ctx: &mut EditorContext<'_>) -> Result<bool> {
        match self {
            EditorAction::AddEntity { .. }
            | EditorAction::ClearSelection
            | EditorAction::SetEntityPosition { .. }
            | EditorAction::SetEntityRotation { .. }
            | EditorAction::RotateEntity { .. }
            | EditorAction::SetEntityScale { .. }
            | EditorAction::RenameEntity { .. }
            | EditorAction::DeleteEntity
            | EditorAction::AddScript { .. }
            | EditorAction::SetUseScript { .. }
            | EditorAction::SetScriptText { .. }
            | EditorAction::LoadScriptText { .. } => Ok(self.apply_entity(ctx)),
            EditorAction::SaveScene { path } => {
                let scene = SceneFile::capture(ctx.entities, ctx.lighting, ctx.keep);
                scene.write(path)?;
                info!("saved scene to {}", path.display());
                Ok(true)
            }
            _ => Ok(self.apply_light(ctx)),
        }
    }

    fn apply_entity(&self, ctx: &mut EditorContext<'_>) -> bool {
        if let EditorAction::AddEntity { type_name } = self {
            let Some(pos) = ctx.spawn_point() else {
                return false;
            };
            let id = ctx.entities.add_by_type(
                type_name,
                pos,
                Rotation::IDENTITY,
                ctx.assets,
                ctx.physics,
                ctx.editor,
            );
            if id.is_some() {
                ctx.selection.entity = id;
            }
            return id.is_some();
        }
        if let EditorAction::ClearSelection = self {
            ctx.selection.entity = None;
            ctx.selection.forget_light();
            return true;
        }

        let Some(id) = ctx.selection.entity else {
            return false;
        };
        if let EditorAction::DeleteEntity = self {
            return ctx.entities.evict(id, ctx.physics, ctx.selection);
        }
        let Some(entity) = ctx.entities.get_mut(id) else {
            return false;
        };
        let physics = &mut *ctx.physics;

        match self {
            EditorAction::SetEntityPosition { axis, value } => {
                let Some(v) = number(value, "position") else {
                    return false;
                };
                let cur = entity.cur_center();
                let target = with_axis(cur, *axis, v);
                entity.move_by(target - cur, physics);
            }
            EditorAction::SetEntityRotation { field, value } => {
                let Some(v) = number(value, "rotation") else {
                    return false;
                };
                let rot = entity.rotation();
                let new_rot = match field {
                    RotationField::Angle => Rotation::from_degrees(rot.axis(), v),
                    RotationField::Axis(axis) => {
                        Rotation::from_axis_angle(with_axis(rot.axis(), *axis, v), rot.angle())
                    }
                };
                entity.set_rotation(new_rot, physics);
            }
            EditorAction::RotateEntity { degrees } => {
                let Some(v) = number(degrees, "rotation") else {
                    return false;
                };
                let axis = entity.rotation().axis();
                entity.rotate_by(Rotation::from_degrees(axis, v), physics);
            }
            EditorAction::SetEntityScale { axis, value } => {
                let Some(v) = number(value, "scale") else {
                    return false;
                };
                let target = with_axis(entity.cur_scale(), *axis, v);
                return entity.scale(target, physics);
            }
            EditorAction::RenameEntity { name } => entity.name = name.clone(),
            EditorAction::AddScript { type_name } => {
                let Some(attached) = script::create_script(type_name) else {
                    return false;
                };
                entity.add_script(attached);
            }
            EditorAction::SetUseScript { index } => return entity.set_use_script(*index),
            EditorAction::SetScriptText { index, text } => {
                let Some(attached) = entity.scripts_mut().get_mut(*index) else {
                    return false;
                };
                attached.set_text(text.clone());
            }
            EditorAction::LoadScriptText { index, path } => {
                let Some(attached) = entity.scripts_mut().get_mut(*index) else {
                    return false;
                };
                if let Err(e) = attached.set_text_from_file(path) {
                    error!("failed to read script text from {}: {}", path.display(), e);
                    return false;
                }
            }
            _ => return false,
        }
        true
    }

    fn apply_light(&self, ctx: &mut EditorContext<'_>) -> bool {
        if let EditorAction::AddLight = self {
            let Some(pos) = ctx.spawn_point() else {
                return false;
            };
            let light = PhongLight::point(
                pos.extend(1.0),
                Vec4::new(0.1, 0.1, 0.1, 1.0),
                Vec4::new(0.0, 0.0, 0.0, 1.0),
                Vec4::new(0.0, 0.0, 0.0, 1.0),
            );
            let id = ctx.lighting.add_with_indicator(
                light,
                ctx.entities,
                ctx.assets,
                ctx.physics,
                ctx.editor,
            );
            let indicator = ctx.lighting.get(id).and_then(|l| l.indicator);
            ctx.selection.select_light(id, indicator);
            return true;
        }

        let Some(id) = ctx.selection.light else {
            return false;
        };
        match self {
            EditorAction::DeleteLight => {
                return ctx.lighting.evict(id, ctx.entities, ctx.cameras, ctx.physics, ctx.selection)
            }
            EditorAction::SetLightPosition { axis, value } => {
                let Some(v) = number(value, "light position") else {
                    return false;
                };
                let Some(cur) = ctx.lighting.get(id).map(PhongLight::position) else {
                    return false;
                };
                return ctx
                    .lighting
                    .set_position(id, with_axis(cur, *axis, v), ctx.entities, ctx.physics);
            }
            EditorAction::ToggleShadows => {
                let Some(light) = ctx.lighting.get_mut(id) else {
                    return false;
                };
                if light.cast_shadows {
                    light.cast_shadows = false;
                    return true;
                }
                return ctx
                    .lighting
                    .make_shadow_caster(id, ctx.cameras, ctx.entities, ctx.physics);
            }
            _ => {}
        }

        let Some(light) = ctx.lighting.get_mut(id) else {
            return false;
        };
        match self {
            EditorAction::SetLightColor { channel, component, value } => {
                let Some(v) = number(value, "light color") else {
                    return false;
                };
                let color = match channel {
                    LightChannel::Ambient => &mut light.a,
                    LightChannel::Diffuse => &mut light.d,
                    LightChannel::Specular => &mut light.s,
                };
                if *component >= 4 {
                    return false;
                }
                color[*component] = v;
            }
            EditorAction::SetSpecularExp { value } => {
                let Some(v) = number(value, "specular exponent") else {
                    return false;
                };
                light.specular_exp = v;
            }
            EditorAction::SetFalloff { value } => {
                let Some(v) = number(value, "falloff") else {
                    return false;
                };
                light.falloff = v;
            }
            EditorAction::SetLightType { kind } => light.kind = *kind,
            EditorAction::SetSpotDirection { axis, value } => {
                let Some(v) = number(value, "spot direction") else {
                    return false;
                };
                light.dir = with_axis(light.dir, *axis, v);
            }
            EditorAction::SetSpotAngle { degrees } => {
                let Some(v) = number(degrees, "spot angle") else {
                    return false;
                };
                light.spot_rads = v.to_radians();
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::test_assets;
    use crate::model::{Camera, Entity, EntityKind};
    use approx::assert_relative_eq;

    struct World {
        entities: EntityManager,
        lighting: LightingManager,
        cameras: CameraManager,
        physics: PhysicsManager,
        assets: AssetStore,
        selection: Selection,
        keep: HashSet<EntityId>,
    }

    impl World {
        fn new() -> Self {
            let mut w = World {
                entities: EntityManager::new(),
                lighting: LightingManager::new(),
                cameras: CameraManager::new(),
                physics: PhysicsManager::new(),
                assets: test_assets(),
                selection: Selection::default(),
                keep: HashSet::new(),
            };
            w.cameras.add("main", Some(Camera::new(0.1, 100.0, 60.0, 1.0)));
            w.cameras.switch("main", &w.entities, &w.physics);
            w
        }

        fn apply(&mut self, action: EditorAction) -> bool {
            let mut ctx = EditorContext {
                entities: &mut self.entities,
                lighting: &mut self.lighting,
                cameras: &mut self.cameras,
                physics: &mut self.physics,
                assets: &mut self.assets,
                selection: &mut self.selection,
                editor: true,
                keep: &self.keep,
            };
            action.apply(&mut ctx).unwrap()
        }

        fn select_new(&mut self, pos: Vec3) -> EntityId {
            let e = Entity::spawn(
                EntityKind::Flowerpot,
                pos,
                Rotation::IDENTITY,
                &mut self.assets,
                &mut self.physics,
                true,
            );
            let id = self.entities.add(e);
            self.selection.entity = Some(id);
            id
        }
    }

    #[test]
    fn test_bad_position_text_leaves_entity_alone() {
        let mut w = World::new();
        let id = w.select_new(Vec3::new(1.0, 2.0, 3.0));
        let applied = w.apply(EditorAction::SetEntityPosition {
            axis: Axis::X,
            value: "abc".to_string(),
        });
        assert!(!applied);
        assert_eq!(w.entities.get(id).unwrap().cur_center(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_set_position_moves_one_axis() {
        let mut w = World::new();
        let id = w.select_new(Vec3::new(1.0, 2.0, 3.0));
        assert!(w.apply(EditorAction::SetEntityPosition {
            axis: Axis::Y,
            value: " 5.5 ".to_string(),
        }));
        let c = w.entities.get(id).unwrap().cur_center();
        assert_relative_eq!(c.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(c.y, 5.5, epsilon = 1e-5);
        assert_relative_eq!(c.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn test_add_entity_in_front_of_camera() {
        let mut w = World::new();
        assert!(w.apply(EditorAction::AddEntity { type_name: "u_flowerpot".to_string() }));
        let id = w.selection.entity.unwrap();
        let c = w.entities.get(id).unwrap().cur_center();
        assert_relative_eq!(c.z, -SPAWN_OFFSET, epsilon = 1e-5);

        assert!(!w.apply(EditorAction::AddEntity { type_name: "u_nope".to_string() }));
        assert_eq!(w.selection.entity, Some(id));
    }

    #[test]
    fn test_rotation_angle_in_degrees() {
        let mut w = World::new();
        let id = w.select_new(Vec3::ZERO);
        assert!(w.apply(EditorAction::SetEntityRotation {
            field: RotationField::Angle,
            value: "90".to_string(),
        }));
        let rot = w.entities.get(id).unwrap().rotation();
        assert_relative_eq!(rot.angle(), std::f32::consts::FRAC_PI_2, epsilon = 1e-4);
        assert!(!w.apply(EditorAction::RotateEntity { degrees: "x".to_string() }));
    }

    #[test]
    fn test_delete_clears_selection() {
        let mut w = World::new();
        let id = w.select_new(Vec3::ZERO);
        assert!(w.apply(EditorAction::DeleteEntity));
        assert!(w.entities.get(id).is_none());
        assert_eq!(w.selection.entity, None);
        assert!(!w.apply(EditorAction::DeleteEntity));
    }

    #[test]
    fn test_scripts_attach_and_edit() {
        let mut w = World::new();
        let id = w.select_new(Vec3::ZERO);
        assert!(w.apply(EditorAction::AddScript { type_name: script::S_TEST_USE.to_string() }));
        assert!(w.apply(EditorAction::SetUseScript { index: 0 }));
        assert!(w.apply(EditorAction::SetScriptText { index: 0, text: "hello".to_string() }));
        assert!(!w.apply(EditorAction::SetScriptText { index: 3, text: "x".to_string() }));
        let e = w.entities.get(id).unwrap();
        assert_eq!(e.use_script_index(), Some(0));
        assert_eq!(e.scripts()[0].text(), Some("hello"));
    }

    #[test]
    fn test_load_script_text_from_file() {
        let mut w = World::new();
        let id = w.select_new(Vec3::ZERO);
        assert!(w.apply(EditorAction::AddScript { type_name: script::S_TEST_USE.to_string() }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.txt");
        std::fs::write(&path, "Field journal").unwrap();
        assert!(w.apply(EditorAction::LoadScriptText { index: 0, path: path.clone() }));
        assert!(!w.apply(EditorAction::LoadScriptText { index: 0, path: dir.path().join("nope.txt") }));
        assert!(!w.apply(EditorAction::LoadScriptText { index: 2, path }));
        assert_eq!(w.entities.get(id).unwrap().scripts()[0].text(), Some("Field journal"));
    }

    #[test]
    fn test_light_edits() {
        let mut w = World::new();
        assert!(w.apply(EditorAction::AddLight));
        let id = w.selection.light.unwrap();
        assert_eq!(w.lighting.get(id).unwrap().a, Vec4::new(0.1, 0.1, 0.1, 1.0));

        assert!(w.apply(EditorAction::SetLightColor {
            channel: LightChannel::Diffuse,
            component: 1,
            value: "0.75".to_string(),
        }));
        assert!(!w.apply(EditorAction::SetFalloff { value: "??".to_string() }));
        assert!(w.apply(EditorAction::SetSpotAngle { degrees: "180".to_string() }));
        assert!(w.apply(EditorAction::SetLightType { kind: LightType::Spot }));

        let light = w.lighting.get(id).unwrap();
        assert_eq!(light.d.y, 0.75);
        assert_eq!(light.falloff, 50.0);
        assert_relative_eq!(light.spot_rads, std::f32::consts::PI, epsilon = 1e-5);
        assert_eq!(light.kind, LightType::Spot);
    }

    #[test]
    fn test_light_position_moves_indicator() {
        let mut w = World::new();
        w.apply(EditorAction::AddLight);
        let id = w.selection.light.unwrap();
        assert!(w.apply(EditorAction::SetLightPosition { axis: Axis::X, value: "4".to_string() }));
        let light = w.lighting.get(id).unwrap();
        assert_relative_eq!(light.position().x, 4.0);
        let indicator = w.entities.get(light.indicator.unwrap()).unwrap();
        assert_relative_eq!(indicator.cur_center().x, 4.0, epsilon = 1e-5);
    }

    #[test]
    fn test_toggle_shadows() {
        let mut w = World::new();
        w.apply(EditorAction::AddLight);
        let id = w.selection.light.unwrap();
        assert!(w.apply(EditorAction::ToggleShadows));
        assert!(w.lighting.get(id).unwrap().shadow_active());
        assert!(w.apply(EditorAction::ToggleShadows));
        assert!(!w.lighting.get(id).unwrap().cast_shadows);
        assert!(w.lighting.get(id).unwrap().shadow().is_some());
    }

    #[test]
    fn test_light_actions_need_selection() {
        let mut w = World::new();
        assert!(!w.apply(EditorAction::DeleteLight));
        assert!(!w.apply(EditorAction::SetSpecularExp { value: "3".to_string() }));
    }
}
