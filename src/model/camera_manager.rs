use std::collections::HashMap;

use tracing::{debug, error};

use crate::controller::physics::PhysicsManager;
use crate::error::Result;
use crate::model::camera::Camera;
use crate::model::entity_manager::EntityManager;
use crate::view::draw::DrawSink;

/// Named cameras plus the single active one
#[derive(Debug, Default)]
pub struct CameraManager {
    cameras: HashMap<String, Camera>,
    active: Option<String>,
}

impl CameraManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cameras.contains_key(name)
    }

    /// Register `camera` (or a default one) under `name`, replacing any
    /// camera previously stored there.
    pub fn add(&mut self, name: &str, camera: Option<Camera>) -> &mut Camera {
        self.evict(name);
        let camera = camera.unwrap_or_else(|| {
            Camera::new(
                crate::config::DEFAULT_NEAR,
                crate::config::DEFAULT_FAR,
                crate::config::DEFAULT_FOV_DEG,
                1.0,
            )
        });
        debug!(name, "added camera");
        self.cameras.entry(name.to_string()).or_insert(camera)
    }

    pub fn evict(&mut self, name: &str) -> Option<Camera> {
        let removed = self.cameras.remove(name);
        if removed.is_some() && self.active.as_deref() == Some(name) {
            self.active = None;
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&Camera> {
        self.cameras.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Camera> {
        self.cameras.get_mut(name)
    }

    /// Activate `name` and bring its position up to date. An unknown name is
    /// an error and leaves the active camera unchanged.
    pub fn switch(
        &mut self,
        name: &str,
        entities: &EntityManager,
        physics: &PhysicsManager,
    ) -> Option<&mut Camera> {
        let Some(camera) = self.cameras.get_mut(name) else {
            error!("cannot switch to unknown camera {:?}", name);
            return None;
        };
        camera.update_cam_pos(entities, physics);
        self.active = Some(name.to_string());
        Some(camera)
    }

    pub fn active(&self) -> Option<&Camera> {
        self.active.as_deref().and_then(|n| self.cameras.get(n))
    }

    pub fn active_mut(&mut self) -> Option<&mut Camera> {
        match self.active.as_deref() {
            Some(name) => self.cameras.get_mut(name),
            None => None,
        }
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Put back a previously active camera name, with no recomputation
    pub fn restore_active(&mut self, name: Option<String>) {
        self.active = name.filter(|n| self.cameras.contains_key(n));
    }

    /// Refresh the active camera's position and matrices
    pub fn update(&mut self, entities: &EntityManager, physics: &PhysicsManager) {
        if let Some(camera) = self.active_mut() {
            camera.update_cam_pos(entities, physics);
        }
    }

    /// Resize every camera's perspective (shadow cameras keep their own)
    pub fn set_aspect_where(&mut self, width: u32, height: u32, filter: impl Fn(&str) -> bool) {
        for (name, camera) in self.cameras.iter_mut() {
            if filter(name) {
                camera.set_aspect(width, height);
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.cameras.keys().map(String::as_str)
    }

    /// Publish world constants and the active camera block. Returns false
    /// when no camera is active (nothing is published).
    pub fn publish(&self, sink: &mut dyn DrawSink) -> Result<bool> {
        let Some(camera) = self.active() else {
            return Ok(false);
        };
        sink.publish_world(camera.world_uniform())?;
        sink.publish_camera(camera.uniform())?;
        Ok(true)
    }
}
