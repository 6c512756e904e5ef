use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{CursorGrabMode, Window, WindowId};

// Import from the library crate
use berilia::{
    config::{Args, EngineConfig},
    controller::{input::native, input::InputEvent, FrameOutcome, Game, InputState},
    error::{EngineError, Result},
    logging,
    model::{assets, AssetStore},
    ui::{self, UiResponse, UiState},
    view::{CommandRecorder, GpuContext, GuiFrame, Renderer},
};

/// Everything that exists once the window is up
struct Engine {
    window: Arc<Window>,
    gpu: GpuContext,
    renderer: Renderer,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    game: Game,
    ui_state: UiState,
    input: InputState,
    recorder: CommandRecorder,
    last_frame_time: Instant,
}

impl Engine {
    fn new(event_loop: &ActiveEventLoop, config: &EngineConfig) -> Result<Self> {
        let attributes = Window::default_attributes()
            .with_title("Berilia")
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height));
        let window = event_loop
            .create_window(attributes)
            .map_err(|e| EngineError::Window(e.to_string()))?;
        let window = Arc::new(window);
        let size = window.inner_size();

        let gpu = pollster::block_on(GpuContext::new(window.clone(), size.width, size.height))?;
        let renderer = Renderer::new(&gpu);

        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            None,
            None,
            None,
        );

        let config = EngineConfig {
            width: size.width.max(1),
            height: size.height.max(1),
            ..config.clone()
        };
        let mut game = Game::new(config.clone(), AssetStore::new(config.asset_root.clone()));
        match &config.scene {
            Some(path) => {
                if let Err(e) = game.load_scene(path) {
                    error!("failed to load scene {}: {}", path.display(), e);
                }
            }
            None => game.add_default_light(),
        }

        Ok(Self {
            window,
            gpu,
            renderer,
            egui_ctx,
            egui_state,
            game,
            ui_state: UiState::default(),
            input: InputState::new(),
            recorder: CommandRecorder::new(),
            last_frame_time: Instant::now(),
        })
    }

    fn resize(&mut self, size: winit::dpi::PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.gpu.resize(size.width, size.height);
        self.renderer.resize(size.width, size.height);
        self.game.resize(size.width, size.height);
    }

    fn set_grab(&mut self, grab: bool) {
        let result = if grab {
            self.window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            self.window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = result {
            warn!("cursor grab failed: {}", e);
        }
        self.window.set_cursor_visible(!grab);
        self.input
            .process_event(&InputEvent::PointerLockChanged { locked: grab });
    }

    fn apply_outcome(&mut self, outcome: FrameOutcome) {
        if let Some(grab) = outcome.grab_cursor {
            self.set_grab(grab);
        }
        if let Some(title) = outcome.title {
            self.window.set_title(&title);
        }
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let dt = (now - self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        let raw_input = self.egui_state.take_egui_input(&self.window);
        let mut response = UiResponse::default();
        let output = self.egui_ctx.run(raw_input, |ctx| {
            response = ui::build_ui(ctx, &self.game, &mut self.ui_state);
        });
        self.egui_state
            .handle_platform_output(&self.window, output.platform_output);

        self.recorder.clear();
        let outcome = self
            .game
            .frame(&mut self.input, &response, dt, &mut self.recorder)?;
        self.apply_outcome(outcome);

        let primitives = self.egui_ctx.tessellate(output.shapes, output.pixels_per_point);
        let gui = GuiFrame {
            primitives: &primitives,
            textures: &output.textures_delta,
            screen: egui_wgpu::ScreenDescriptor {
                size_in_pixels: [self.gpu.config.width, self.gpu.config.height],
                pixels_per_point: output.pixels_per_point,
            },
        };
        self.renderer
            .render(&self.gpu, self.recorder.commands(), &self.game.assets, gui)
    }
}

struct App {
    config: EngineConfig,
    engine: Option<Engine>,
    failed: bool,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }
        match Engine::new(event_loop, &self.config) {
            Ok(engine) => {
                info!("engine started");
                engine.window.request_redraw();
                self.engine = Some(engine);
            }
            Err(e) => {
                error!("startup failed: {}", e);
                self.failed = true;
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let _ = engine.egui_state.on_window_event(&engine.window, &event);
        if let Some(input) = native::window_event_to_input(&event) {
            engine.input.process_event(&input);
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => engine.resize(size),
            WindowEvent::Focused(false) if engine.input.pointer_locked => engine.set_grab(false),
            WindowEvent::RedrawRequested => {
                if let Err(e) = engine.redraw() {
                    error!("frame failed: {}", e);
                    self.failed = true;
                    event_loop.exit();
                    return;
                }
                if engine.game.quit {
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        if let Some(engine) = self.engine.as_mut() {
            if let Some(input) = native::device_event_to_input(&event) {
                engine.input.process_event(&input);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(engine) = &self.engine {
            engine.window.request_redraw();
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init();

    if let Some(paths) = &args.convert {
        let [mesh, json] = paths.as_slice() else {
            error!("--convert takes a mesh path and a JSON path");
            return ExitCode::FAILURE;
        };
        return match assets::export_mesh_json(mesh, json) {
            Ok(_) => ExitCode::SUCCESS,
            Err(e) => {
                error!("conversion failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = EngineConfig::from_args(&args);
    info!(editor = config.editor, scene = ?config.scene, "starting berilia");

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut app = App {
        config,
        engine: None,
        failed: false,
    };
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("event loop error: {}", e);
        return ExitCode::FAILURE;
    }
    if app.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
