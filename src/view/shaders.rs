use std::collections::HashMap;

use tracing::{error, trace};

use crate::controller::ShadowSlot;
use crate::error::Result;
use crate::model::CameraManager;
use crate::view::draw::DrawSink;

pub const NORMAL_SHADER: &str = "normal shader";
pub const DEPTH_SHADER: &str = "Depth buffer";
pub const PHYS_DEBUG_SHADER: &str = "phys debug shader";
pub const GUI_SHADER: &str = "GUI shader";

/// Pipeline a logical shader key resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Normal,
    Depth,
    PhysDebug,
    Gui,
}

impl ShaderKind {
    pub fn source(self) -> &'static str {
        match self {
            ShaderKind::Normal => include_str!("shaders/normal.wgsl"),
            ShaderKind::Depth => include_str!("shaders/depth.wgsl"),
            ShaderKind::PhysDebug => include_str!("shaders/debug_lines.wgsl"),
            // egui brings its own program
            ShaderKind::Gui => "",
        }
    }
}

/// Logical shader registry plus the "current shader" slot
#[derive(Debug)]
pub struct ShaderStore {
    programs: HashMap<String, ShaderKind>,
    current: Option<String>,
}

impl Default for ShaderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderStore {
    pub fn new() -> Self {
        let programs = [
            (NORMAL_SHADER, ShaderKind::Normal),
            (DEPTH_SHADER, ShaderKind::Depth),
            (PHYS_DEBUG_SHADER, ShaderKind::PhysDebug),
            (GUI_SHADER, ShaderKind::Gui),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            programs,
            current: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<ShaderKind> {
        self.programs.get(key).copied()
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_kind(&self) -> Option<ShaderKind> {
        self.current.as_deref().and_then(|k| self.get(k))
    }

    /// Make `key` current and, when a camera is active, re-publish world
    /// constants, camera matrices and the lighting buffer to the sink.
    /// Returns false (and changes nothing) for an unknown key.
    pub fn swap_shader(
        &mut self,
        key: &str,
        cameras: &CameraManager,
        lighting: (&[f32], &[ShadowSlot]),
        sink: &mut dyn DrawSink,
    ) -> Result<bool> {
        let Some(kind) = self.get(key) else {
            error!("unknown shader {:?}", key);
            return Ok(false);
        };
        self.current = Some(key.to_string());
        sink.use_shader(kind)?;
        if cameras.publish(sink)? {
            sink.publish_lighting(lighting.0, lighting.1)?;
        }
        trace!(key, "swapped shader");
        Ok(true)
    }

    /// Put back a previously recorded current shader without publishing
    pub fn restore_current(&mut self, key: Option<String>) {
        self.current = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::draw::{CommandRecorder, DrawCommand};

    #[test]
    fn test_unknown_shader_is_rejected() {
        let mut shaders = ShaderStore::new();
        let cameras = CameraManager::new();
        let mut rec = CommandRecorder::new();
        assert!(!shaders.swap_shader("nope", &cameras, (&[], &[]), &mut rec).unwrap());
        assert_eq!(shaders.current(), None);
        assert!(rec.commands().is_empty());
    }

    #[test]
    fn test_swap_without_camera_publishes_nothing() {
        let mut shaders = ShaderStore::new();
        let cameras = CameraManager::new();
        let mut rec = CommandRecorder::new();
        assert!(shaders.swap_shader(DEPTH_SHADER, &cameras, (&[], &[]), &mut rec).unwrap());
        assert_eq!(shaders.current(), Some(DEPTH_SHADER));
        assert!(matches!(rec.commands(), [DrawCommand::Shader(ShaderKind::Depth)]));
    }
}
