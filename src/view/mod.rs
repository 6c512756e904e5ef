// VIEW: Draw recording, shaders and the wgpu renderer
pub mod draw;
pub mod gpu_init;
pub mod render;
pub mod shaders;

pub use draw::{CommandRecorder, DrawCommand, DrawSink, RenderTarget, ScopedPass};
pub use gpu_init::GpuContext;
pub use render::{GuiFrame, Renderer};
pub use shaders::ShaderStore;
