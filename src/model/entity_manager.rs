use std::collections::{HashMap, HashSet};

use glam::Vec3;
use tracing::{debug, error};

use crate::controller::physics::{BodyHandle, PhysicsManager};
use crate::error::Result;
use crate::model::assets::AssetStore;
use crate::model::camera_manager::CameraManager;
use crate::model::entity::{Entity, EntityId, EntityKind};
use crate::model::lighting::LightId;
use crate::model::rotation::Rotation;
use crate::model::script::ScriptContext;
use crate::view::draw::DrawSink;

/// What the user currently has hold of
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    /// Editor/paused-mode click selection
    pub entity: Option<EntityId>,
    pub light: Option<LightId>,
    /// Indicator entity of the selected light
    pub light_indicator: Option<EntityId>,
    /// Crosshair target, refreshed every unpaused frame
    pub looking_at: Option<EntityId>,
}

impl Selection {
    /// Drop every reference to an entity that is going away
    pub fn forget_entity(&mut self, id: EntityId) {
        if self.entity == Some(id) {
            self.entity = None;
        }
        if self.looking_at == Some(id) {
            self.looking_at = None;
        }
        if self.light_indicator == Some(id) {
            self.forget_light();
        }
    }

    pub fn select_light(&mut self, id: LightId, indicator: Option<EntityId>) {
        self.light = Some(id);
        self.light_indicator = indicator;
    }

    pub fn forget_light(&mut self) {
        self.light = None;
        self.light_indicator = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Owns entities in insertion order, plus nested child managers
#[derive(Debug, Default)]
pub struct EntityManager {
    entities: Vec<Entity>,
    children: Vec<EntityManager>,
    by_body: HashMap<BodyHandle, EntityId>,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities owned directly by this manager
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in this manager and every descendant
    pub fn total_len(&self) -> usize {
        self.entities.len() + self.children.iter().map(EntityManager::total_len).sum::<usize>()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn children(&self) -> &[EntityManager] {
        &self.children
    }

    pub fn add_child(&mut self, child: EntityManager) -> &mut EntityManager {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn add(&mut self, entity: Entity) -> EntityId {
        let id = entity.id();
        if let Some(handle) = entity.body_handle() {
            self.by_body.insert(handle, id);
        }
        self.entities.push(entity);
        id
    }

    /// Factory entry point. An unknown type string creates nothing.
    pub fn add_by_type(
        &mut self,
        type_str: &str,
        pos: Vec3,
        rot: Rotation,
        assets: &mut AssetStore,
        physics: &mut PhysicsManager,
        editor: bool,
    ) -> Option<EntityId> {
        let Some(kind) = EntityKind::from_type_str(type_str) else {
            error!("unknown entity type {:?}", type_str);
            return None;
        };
        let entity = Entity::spawn(kind, pos, rot, assets, physics, editor);
        Some(self.add(entity))
    }

    /// Remove and destroy an entity anywhere in the tree, clearing any
    /// selection that points at it. Returns false if it was not found.
    pub fn evict(
        &mut self,
        id: EntityId,
        physics: &mut PhysicsManager,
        selection: &mut Selection,
    ) -> bool {
        let Some(entity) = self.take(id) else {
            return false;
        };
        selection.forget_entity(id);
        entity.destroy(physics);
        true
    }

    fn take(&mut self, id: EntityId) -> Option<Entity> {
        if let Some(idx) = self.entities.iter().position(|e| e.id() == id) {
            let entity = self.entities.remove(idx);
            if let Some(handle) = entity.body_handle() {
                self.by_body.remove(&handle);
            }
            return Some(entity);
        }
        self.children.iter_mut().find_map(|c| c.take(id))
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.id() == id)
            .or_else(|| self.children.iter().find_map(|c| c.get(id)))
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        if let Some(idx) = self.entities.iter().position(|e| e.id() == id) {
            return self.entities.get_mut(idx);
        }
        self.children.iter_mut().find_map(|c| c.get_mut(id))
    }

    /// Owner of a rigid body. Bodies no entity owns resolve to None.
    pub fn get_by_body(&self, body: BodyHandle) -> Option<EntityId> {
        self.by_body
            .get(&body)
            .copied()
            .or_else(|| self.children.iter().find_map(|c| c.get_by_body(body)))
    }

    /// Sync every entity from physics, then run its scripts unless in editor mode
    pub fn update(
        &mut self,
        physics: &PhysicsManager,
        editor: bool,
        dt: f32,
        ctx: &mut ScriptContext<'_>,
    ) {
        for entity in self.entities.iter_mut() {
            entity.update(physics);
            if !editor {
                entity.run_scripts(dt, ctx);
            }
        }
        for child in self.children.iter_mut() {
            child.update(physics, editor, dt, ctx);
        }
    }

    /// Draw this manager's entities and its children's, skipping `exclude`
    pub fn draw(
        &self,
        cameras: &CameraManager,
        sink: &mut dyn DrawSink,
        exclude: &HashSet<EntityId>,
    ) -> Result<()> {
        self.try_for_each(true, &mut |e: &Entity| {
            if exclude.contains(&e.id()) {
                return Ok(());
            }
            e.draw(cameras, sink)
        })
    }

    /// Visit own entities first, then (optionally) each child manager
    pub fn for_each(&self, include_children: bool, f: &mut dyn FnMut(&Entity)) {
        for entity in &self.entities {
            f(entity);
        }
        if include_children {
            for child in &self.children {
                child.for_each(true, f);
            }
        }
    }

    /// Like `for_each`, stopping at the first error
    pub fn try_for_each(
        &self,
        include_children: bool,
        f: &mut dyn FnMut(&Entity) -> Result<()>,
    ) -> Result<()> {
        for entity in &self.entities {
            f(entity)?;
        }
        if include_children {
            for child in &self.children {
                child.try_for_each(true, f)?;
            }
        }
        Ok(())
    }

    /// Destroy everything, children included
    pub fn clear(&mut self, physics: &mut PhysicsManager, selection: &mut Selection) {
        self.clear_except(&HashSet::new(), physics, selection);
    }

    /// Destroy every entity not in `keep`. Emptied child managers are dropped.
    pub fn clear_except(
        &mut self,
        keep: &HashSet<EntityId>,
        physics: &mut PhysicsManager,
        selection: &mut Selection,
    ) {
        let (kept, gone): (Vec<Entity>, Vec<Entity>) = self
            .entities
            .drain(..)
            .partition(|e| keep.contains(&e.id()));
        for entity in gone {
            if let Some(handle) = entity.body_handle() {
                self.by_body.remove(&handle);
            }
            selection.forget_entity(entity.id());
            entity.destroy(physics);
        }
        self.entities = kept;
        for child in self.children.iter_mut() {
            child.clear_except(keep, physics, selection);
        }
        self.children.retain(|c| c.total_len() > 0);
        debug!(kept = self.entities.len(), "cleared entity manager");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::camera::Camera;
    use crate::model::entity::test_assets;
    use crate::ui::Overlay;
    use crate::view::draw::CommandRecorder;

    fn spawn(
        manager: &mut EntityManager,
        kind: &str,
        pos: Vec3,
        assets: &mut AssetStore,
        physics: &mut PhysicsManager,
    ) -> EntityId {
        manager
            .add_by_type(kind, pos, Rotation::IDENTITY, assets, physics, false)
            .unwrap()
    }

    #[test]
    fn test_unknown_type_creates_nothing() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut manager = EntityManager::new();
        assert!(manager
            .add_by_type("u_bogus", Vec3::ZERO, Rotation::IDENTITY, &mut assets, &mut physics, false)
            .is_none());
        assert!(manager.is_empty());
        assert_eq!(physics.num_bodies(), 0);
    }

    #[test]
    fn test_body_lookup_and_evict_clears_selection() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut manager = EntityManager::new();
        let id = spawn(&mut manager, "u_flowerpot", Vec3::ZERO, &mut assets, &mut physics);
        let handle = manager.get(id).unwrap().body_handle().unwrap();
        assert_eq!(manager.get_by_body(handle), Some(id));

        let mut selection = Selection {
            entity: Some(id),
            looking_at: Some(id),
            ..Selection::default()
        };
        assert!(manager.evict(id, &mut physics, &mut selection));
        assert_eq!(selection, Selection::default());
        assert_eq!(manager.get_by_body(handle), None);
        assert!(!physics.contains(handle));
        assert!(!manager.evict(id, &mut physics, &mut selection));
    }

    #[test]
    fn test_evicting_indicator_drops_light_selection() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut manager = EntityManager::new();
        let indicator = spawn(&mut manager, "u_light_ind", Vec3::ZERO, &mut assets, &mut physics);
        let other = spawn(&mut manager, "u_flowerpot", Vec3::X, &mut assets, &mut physics);

        let mut selection = Selection::default();
        selection.select_light(LightId::next(), Some(indicator));
        assert!(manager.evict(other, &mut physics, &mut selection));
        assert!(selection.light.is_some());

        assert!(manager.evict(indicator, &mut physics, &mut selection));
        assert_eq!(selection.light, None);
        assert_eq!(selection.light_indicator, None);
    }

    #[test]
    fn test_children_are_visited_after_own_entities() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut root = EntityManager::new();
        let a = spawn(&mut root, "u_c_toolbox", Vec3::ZERO, &mut assets, &mut physics);
        let mut child = EntityManager::new();
        let b = spawn(&mut child, "u_c_microscope", Vec3::X, &mut assets, &mut physics);
        root.add_child(child);
        let c = spawn(&mut root, "u_c_circuit_1", Vec3::Y, &mut assets, &mut physics);

        let mut seen = Vec::new();
        root.for_each(true, &mut |e| seen.push(e.id()));
        assert_eq!(seen, vec![a, c, b]);

        seen.clear();
        root.for_each(false, &mut |e| seen.push(e.id()));
        assert_eq!(seen, vec![a, c]);

        assert!(root.get(b).is_some());
        let body_b = root.get(b).unwrap().body_handle().unwrap();
        assert_eq!(root.get_by_body(body_b), Some(b));
        assert_eq!(root.total_len(), 3);

        let mut selection = Selection::default();
        assert!(root.evict(b, &mut physics, &mut selection));
        assert_eq!(root.total_len(), 2);
    }

    #[test]
    fn test_draw_skips_excluded() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut manager = EntityManager::new();
        let a = spawn(&mut manager, "u_c_toolbox", Vec3::ZERO, &mut assets, &mut physics);
        spawn(&mut manager, "u_flowerpot", Vec3::X, &mut assets, &mut physics);

        let mut cameras = CameraManager::new();
        cameras.add("main", Some(Camera::new(0.1, 10.0, 60.0, 1.0)));
        cameras.switch("main", &manager, &physics);

        let mut rec = CommandRecorder::new();
        manager.draw(&cameras, &mut rec, &HashSet::from([a])).unwrap();
        assert_eq!(rec.mesh_draws().count(), 1);
    }

    #[test]
    fn test_editor_update_skips_scripts() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut manager = EntityManager::new();
        let id = spawn(&mut manager, "u_c_toolbox", Vec3::ZERO, &mut assets, &mut physics);
        manager
            .get_mut(id)
            .unwrap()
            .add_script(Box::new(crate::model::script::TestUseScript::new("x")));

        let mut paused = false;
        let mut overlay = Overlay::None;
        let mut ctx = ScriptContext {
            paused: &mut paused,
            overlay: &mut overlay,
        };
        manager.update(&physics, true, 0.016, &mut ctx);
        assert!(!*ctx.paused);
        manager.update(&physics, false, 0.016, &mut ctx);
        assert!(*ctx.paused);
    }

    #[test]
    fn test_clear_removes_all_bodies() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut root = EntityManager::new();
        spawn(&mut root, "u_c_toolbox", Vec3::ZERO, &mut assets, &mut physics);
        let mut child = EntityManager::new();
        spawn(&mut child, "u_flowerpot", Vec3::X, &mut assets, &mut physics);
        root.add_child(child);
        let mut selection = Selection::default();
        root.clear(&mut physics, &mut selection);
        assert_eq!(root.total_len(), 0);
        assert!(root.children().is_empty());
        assert_eq!(physics.num_bodies(), 0);
    }

    #[test]
    fn test_clear_except_keeps_listed() {
        let mut assets = test_assets();
        let mut physics = PhysicsManager::new();
        let mut root = EntityManager::new();
        let player = spawn(&mut root, "u_player_mesh", Vec3::ZERO, &mut assets, &mut physics);
        spawn(&mut root, "u_c_toolbox", Vec3::X, &mut assets, &mut physics);
        let mut selection = Selection::default();
        root.clear_except(&HashSet::from([player]), &mut physics, &mut selection);
        assert_eq!(root.len(), 1);
        assert!(root.get(player).is_some());
        let body = root.get(player).unwrap().body_handle().unwrap();
        assert_eq!(root.get_by_body(body), Some(player));
        assert_eq!(physics.num_bodies(), 1);
    }
}
