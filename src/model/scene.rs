// MODEL: Scene records and their mapping onto entities and lights

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::physics::PhysicsManager;
use crate::error::Result;
use crate::model::assets::AssetStore;
use crate::model::camera_manager::CameraManager;
use crate::model::entity::{Entity, EntityId, EntityKind};
use crate::model::entity_manager::{EntityManager, Selection};
use crate::model::lighting::{LightType, LightingManager, PhongLight};
use crate::model::rotation::Rotation;
use crate::model::script;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScriptRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_use: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnityRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: String,
    pub pos_x: f32,
    pub pos_y: f32,
    pub pos_z: f32,
    /// Rotation angle, radians
    #[serde(default)]
    pub rot_t: f32,
    #[serde(default)]
    pub rot_x: f32,
    #[serde(default)]
    pub rot_y: f32,
    #[serde(default = "one")]
    pub rot_z: f32,
    #[serde(default = "one")]
    pub scale_x: f32,
    #[serde(default = "one")]
    pub scale_y: f32,
    #[serde(default = "one")]
    pub scale_z: f32,
    #[serde(default)]
    pub scripts: Vec<ScriptRecord>,
}

fn one() -> f32 {
    1.0
}

impl UnityRecord {
    pub fn from_entity(entity: &Entity) -> Self {
        let pos = entity.cur_center();
        let rot = entity.rotation();
        let scale = entity.cur_scale();
        let use_idx = entity.use_script_index();
        let scripts = entity
            .scripts()
            .iter()
            .enumerate()
            .map(|(i, s)| ScriptRecord {
                type_name: s.type_name().to_string(),
                txt: s.text().map(str::to_string),
                on_use: (Some(i) == use_idx).then_some(true),
            })
            .collect();
        Self {
            type_name: entity.type_str().to_string(),
            name: entity.name.clone(),
            pos_x: pos.x,
            pos_y: pos.y,
            pos_z: pos.z,
            rot_t: rot.angle(),
            rot_x: rot.axis().x,
            rot_y: rot.axis().y,
            rot_z: rot.axis().z,
            scale_x: scale.x,
            scale_y: scale.y,
            scale_z: scale.z,
            scripts,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.pos_x, self.pos_y, self.pos_z)
    }

    pub fn rotation(&self) -> Rotation {
        Rotation::from_axis_angle(Vec3::new(self.rot_x, self.rot_y, self.rot_z), self.rot_t)
    }

    pub fn scale(&self) -> Vec3 {
        Vec3::new(self.scale_x, self.scale_y, self.scale_z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightRecord {
    pub p_x: f32,
    pub p_y: f32,
    pub p_z: f32,
    pub p_a: f32,
    pub a_r: f32,
    pub a_g: f32,
    pub a_b: f32,
    pub a_a: f32,
    pub d_r: f32,
    pub d_g: f32,
    pub d_b: f32,
    pub d_a: f32,
    pub s_r: f32,
    pub s_g: f32,
    pub s_b: f32,
    pub s_a: f32,
    pub s_e: f32,
    pub f: f32,
    pub l_type: i32,
    pub sp_dir_x: f32,
    pub sp_dir_y: f32,
    pub sp_dir_z: f32,
    pub sp_dir_t: f32,
}

impl From<&PhongLight> for LightRecord {
    fn from(l: &PhongLight) -> Self {
        Self {
            p_x: l.pos.x,
            p_y: l.pos.y,
            p_z: l.pos.z,
            p_a: l.pos.w,
            a_r: l.a.x,
            a_g: l.a.y,
            a_b: l.a.z,
            a_a: l.a.w,
            d_r: l.d.x,
            d_g: l.d.y,
            d_b: l.d.z,
            d_a: l.d.w,
            s_r: l.s.x,
            s_g: l.s.y,
            s_b: l.s.z,
            s_a: l.s.w,
            s_e: l.specular_exp,
            f: l.falloff,
            l_type: l.kind.as_f32() as i32,
            sp_dir_x: l.dir.x,
            sp_dir_y: l.dir.y,
            sp_dir_z: l.dir.z,
            sp_dir_t: l.spot_rads,
        }
    }
}

impl LightRecord {
    pub fn to_light(&self) -> PhongLight {
        let mut light = PhongLight::point(
            Vec4::new(self.p_x, self.p_y, self.p_z, self.p_a),
            Vec4::new(self.a_r, self.a_g, self.a_b, self.a_a),
            Vec4::new(self.d_r, self.d_g, self.d_b, self.d_a),
            Vec4::new(self.s_r, self.s_g, self.s_b, self.s_a),
        );
        light.specular_exp = self.s_e;
        light.falloff = self.f;
        light.kind = LightType::from_f32(self.l_type as f32);
        light.dir = Vec3::new(self.sp_dir_x, self.sp_dir_y, self.sp_dir_z);
        light.spot_rads = self.sp_dir_t;
        light
    }
}

/// On-disk scene
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneFile {
    #[serde(default)]
    pub unities: Vec<UnityRecord>,
    #[serde(default)]
    pub phong_lights: Vec<LightRecord>,
}

/// Everything a scene load touches
pub struct SceneTarget<'a> {
    pub entities: &'a mut EntityManager,
    pub lighting: &'a mut LightingManager,
    pub cameras: &'a mut CameraManager,
    pub physics: &'a mut PhysicsManager,
    pub assets: &'a mut AssetStore,
    pub selection: &'a mut Selection,
    pub editor: bool,
    /// Entities that survive the clear and are never saved (the player)
    pub keep: &'a HashSet<EntityId>,
}

impl SceneFile {
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Snapshot the world. Light indicators and `skip` are left out; lights
    /// recreate their indicators on load.
    pub fn capture(
        entities: &EntityManager,
        lighting: &LightingManager,
        skip: &HashSet<EntityId>,
    ) -> Self {
        let mut unities = Vec::new();
        entities.for_each(true, &mut |e: &Entity| {
            if e.kind() == EntityKind::LightIndicator || skip.contains(&e.id()) {
                return;
            }
            unities.push(UnityRecord::from_entity(e));
        });
        Self {
            unities,
            phong_lights: lighting.lights().iter().map(LightRecord::from).collect(),
        }
    }

    /// Replace the current world with this scene
    pub fn apply(&self, target: SceneTarget<'_>) {
        let SceneTarget {
            entities,
            lighting,
            cameras,
            physics,
            assets,
            selection,
            editor,
            keep,
        } = target;

        lighting.clear(entities, cameras, physics, selection);
        entities.clear_except(keep, physics, selection);

        for record in &self.unities {
            if record.type_name == EntityKind::LightIndicator.type_str() {
                continue;
            }
            let Some(id) = entities.add_by_type(
                &record.type_name,
                Vec3::ZERO,
                Rotation::IDENTITY,
                assets,
                physics,
                editor,
            ) else {
                continue;
            };
            let Some(entity) = entities.get_mut(id) else {
                continue;
            };
            entity.name = record.name.clone();
            entity.scale(record.scale(), physics);
            entity.translate(record.position(), physics);
            entity.set_rotation(record.rotation(), physics);
            for script_record in &record.scripts {
                let Some(mut attached) = script::create_script(&script_record.type_name) else {
                    continue;
                };
                if let Some(text) = &script_record.txt {
                    attached.set_text(text.clone());
                }
                let idx = entity.add_script(attached);
                if script_record.on_use.is_some() {
                    entity.set_use_script(idx);
                }
            }
        }

        for record in &self.phong_lights {
            lighting.add_with_indicator(record.to_light(), entities, assets, physics, editor);
        }
        info!(
            unities = self.unities.len(),
            lights = self.phong_lights.len(),
            "scene loaded"
        );
    }
}

/// Read and apply a scene file. Failures are logged and leave the world as it was.
pub fn load_scene(path: &Path, target: SceneTarget<'_>) -> Result<()> {
    let scene = SceneFile::read(path).inspect_err(|e| {
        warn!("could not read scene {}: {}", path.display(), e);
    })?;
    scene.apply(target);
    Ok(())
}
