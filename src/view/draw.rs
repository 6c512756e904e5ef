use std::sync::Arc;

use glam::Mat4;
use tracing::trace;

use crate::controller::physics::{DebugLine, PhysicsManager};
use crate::controller::{CameraUniform, ShadowSlot, WorldUniform};
use crate::error::Result;
use crate::model::{CameraManager, EntityManager};
use crate::utils::Mesh;
use crate::view::shaders::{ShaderKind, ShaderStore};

/// Where subsequent draws land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// One layer of the shadow depth array, cleared on begin
    ShadowLayer(u32),
    /// Swapchain color + depth, cleared on begin
    Screen,
    /// GUI overlay on top of the screen, no depth test
    Overlay,
}

#[derive(Debug, Clone)]
pub struct MeshDraw {
    pub transform: Mat4,
    pub mesh: Arc<Mesh>,
    pub texture: Option<String>,
}

/// One recorded rendering operation
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Target(RenderTarget),
    Shader(ShaderKind),
    World(WorldUniform),
    Camera(CameraUniform),
    Lighting {
        buffer: Vec<f32>,
        shadows: Vec<ShadowSlot>,
    },
    Mesh(MeshDraw),
    Lines(Vec<DebugLine>),
}

/// Receiver of draw operations. The frame records into a [`CommandRecorder`]
/// which the wgpu renderer replays.
pub trait DrawSink {
    fn begin_target(&mut self, target: RenderTarget) -> Result<()>;
    fn use_shader(&mut self, shader: ShaderKind) -> Result<()>;
    fn publish_world(&mut self, world: WorldUniform) -> Result<()>;
    fn publish_camera(&mut self, camera: CameraUniform) -> Result<()>;
    fn publish_lighting(&mut self, buffer: &[f32], shadows: &[ShadowSlot]) -> Result<()>;
    fn draw_mesh(&mut self, draw: MeshDraw) -> Result<()>;
    fn draw_lines(&mut self, lines: &[DebugLine]) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct CommandRecorder {
    commands: Vec<DrawCommand>,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn mesh_draws(&self) -> impl Iterator<Item = &MeshDraw> {
        self.commands.iter().filter_map(|c| match c {
            DrawCommand::Mesh(d) => Some(d),
            _ => None,
        })
    }
}

impl DrawSink for CommandRecorder {
    fn begin_target(&mut self, target: RenderTarget) -> Result<()> {
        self.commands.push(DrawCommand::Target(target));
        Ok(())
    }

    fn use_shader(&mut self, shader: ShaderKind) -> Result<()> {
        self.commands.push(DrawCommand::Shader(shader));
        Ok(())
    }

    fn publish_world(&mut self, world: WorldUniform) -> Result<()> {
        self.commands.push(DrawCommand::World(world));
        Ok(())
    }

    fn publish_camera(&mut self, camera: CameraUniform) -> Result<()> {
        self.commands.push(DrawCommand::Camera(camera));
        Ok(())
    }

    fn publish_lighting(&mut self, buffer: &[f32], shadows: &[ShadowSlot]) -> Result<()> {
        self.commands.push(DrawCommand::Lighting {
            buffer: buffer.to_vec(),
            shadows: shadows.to_vec(),
        });
        Ok(())
    }

    fn draw_mesh(&mut self, draw: MeshDraw) -> Result<()> {
        self.commands.push(DrawCommand::Mesh(draw));
        Ok(())
    }

    fn draw_lines(&mut self, lines: &[DebugLine]) -> Result<()> {
        self.commands.push(DrawCommand::Lines(lines.to_vec()));
        Ok(())
    }
}

/// Temporarily substitutes the active camera and current shader.
///
/// The previous camera name and shader key are put back when the scope is
/// dropped, including on early `?` returns and unwinding panics.
pub struct ScopedPass<'a> {
    cameras: &'a mut CameraManager,
    shaders: &'a mut ShaderStore,
    prev_camera: Option<String>,
    prev_shader: Option<String>,
}

impl<'a> ScopedPass<'a> {
    pub fn new(cameras: &'a mut CameraManager, shaders: &'a mut ShaderStore) -> Self {
        let prev_camera = cameras.active_name().map(str::to_string);
        let prev_shader = shaders.current().map(str::to_string);
        trace!(?prev_camera, ?prev_shader, "entering scoped pass");
        Self {
            cameras,
            shaders,
            prev_camera,
            prev_shader,
        }
    }

    pub fn cameras(&self) -> &CameraManager {
        &*self.cameras
    }

    /// Make `name` the active camera for the rest of the scope
    pub fn switch_camera(
        &mut self,
        name: &str,
        entities: &EntityManager,
        physics: &PhysicsManager,
    ) -> bool {
        self.cameras.switch(name, entities, physics).is_some()
    }

    pub fn swap_shader(
        &mut self,
        key: &str,
        lighting: (&[f32], &[ShadowSlot]),
        sink: &mut dyn DrawSink,
    ) -> Result<bool> {
        self.shaders.swap_shader(key, &*self.cameras, lighting, sink)
    }
}

impl Drop for ScopedPass<'_> {
    fn drop(&mut self) {
        self.cameras.restore_active(self.prev_camera.take());
        self.shaders.restore_current(self.prev_shader.take());
        trace!("left scoped pass");
    }
}
