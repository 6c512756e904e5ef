use std::collections::HashSet;

use glam::{Vec3, Vec4};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::controller::camera_controller::CameraController;
use crate::controller::editor::{EditorAction, EditorContext};
use crate::controller::input::{InputProcessor, InputState};
use crate::controller::physics::PhysicsManager;
use crate::error::Result;
use crate::model::camera::Camera;
use crate::model::entity::EntityKind;
use crate::model::scene::{self, SceneTarget};
use crate::model::script::{self, Script, ScriptContext};
use crate::model::{
    AssetStore, CameraManager, EntityId, EntityManager, LightingManager, PhongLight, Rotation,
    RotationMode, Selection,
};
use crate::ui::{Overlay, UiResponse};
use crate::view::draw::{DrawSink, RenderTarget};
use crate::view::shaders::{ShaderStore, GUI_SHADER, NORMAL_SHADER, PHYS_DEBUG_SHADER};

/// Name of the first-person camera created at startup
pub const CAM_NORMAL: &str = "cam_normal";
/// Crosshair picks farther away than this are ignored
pub const MAX_PICK_DISTANCE: f32 = 4.0;
/// Window title refresh interval, seconds
pub const FPS_INTERVAL: f32 = 0.25;
/// Frame time cap so a stall does not explode the physics step
pub const MAX_FRAME_DT: f32 = 0.25;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub transform: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct WorldUniform {
    pub near: f32,
    pub far: f32,
    pub _pad: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TransformUniform {
    pub model: [[f32; 4]; 4],
}

/// Light-space matrix for one selected light; `layer[0]` is the depth array
/// layer, or -1 when the light casts no shadow.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowSlot {
    pub view_proj: [[f32; 4]; 4],
    pub layer: [f32; 4],
}

/// Frames-per-second counter, reporting at most once per `FPS_INTERVAL`
#[derive(Debug, Default, Clone)]
pub struct FpsCounter {
    frames: u32,
    elapsed: f32,
    pub fps: f32,
}

impl FpsCounter {
    /// Count one frame. Returns the new rate when it was recomputed.
    pub fn tick(&mut self, dt: f32) -> Option<f32> {
        self.frames += 1;
        self.elapsed += dt;
        if self.elapsed < FPS_INTERVAL {
            return None;
        }
        self.fps = self.frames as f32 / self.elapsed;
        self.frames = 0;
        self.elapsed = 0.0;
        Some(self.fps)
    }
}

/// What the window layer should do after a frame
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameOutcome {
    /// Grab (true) or release (false) the cursor
    pub grab_cursor: Option<bool>,
    pub title: Option<String>,
}

/// Whole-engine state plus the ordered per-frame pipeline
pub struct Game {
    pub config: EngineConfig,
    pub assets: AssetStore,
    pub physics: PhysicsManager,
    pub entities: EntityManager,
    pub cameras: CameraManager,
    pub lighting: LightingManager,
    pub shaders: ShaderStore,
    pub selection: Selection,
    pub global_scripts: Vec<Box<dyn Script>>,
    pub paused: bool,
    pub overlay: Overlay,
    pub quit: bool,
    pub draw_phys_debug: bool,
    pub fps: FpsCounter,
    player: Option<EntityId>,
    processor: InputProcessor,
    controller: CameraController,
    viewport: (u32, u32),
}

impl Game {
    /// Startup: the normal camera, and outside editor mode the player body
    /// it rides on.
    pub fn new(config: EngineConfig, assets: AssetStore) -> Self {
        let viewport = (config.width.max(1), config.height.max(1));
        let mut game = Self {
            assets,
            physics: PhysicsManager::new(),
            entities: EntityManager::new(),
            cameras: CameraManager::new(),
            lighting: LightingManager::new(),
            shaders: ShaderStore::new(),
            selection: Selection::default(),
            global_scripts: Vec::new(),
            paused: false,
            overlay: Overlay::None,
            quit: false,
            draw_phys_debug: false,
            fps: FpsCounter::default(),
            player: None,
            processor: InputProcessor::default(),
            controller: CameraController::new(),
            viewport,
            config,
        };

        let mut camera = Camera::new(
            game.config.near,
            game.config.far,
            game.config.fov_deg,
            game.config.aspect(),
        );
        if !game.config.editor {
            game.player = game.spawn_player();
            camera.bind(game.player);
        }
        game.cameras.add(CAM_NORMAL, Some(camera));
        game.cameras.switch(CAM_NORMAL, &game.entities, &game.physics);
        info!(editor = game.config.editor, "game initialised");
        game
    }

    fn spawn_player(&mut self) -> Option<EntityId> {
        let id = self.entities.add_by_type(
            EntityKind::PlayerMesh.type_str(),
            Vec3::ZERO,
            Rotation::IDENTITY,
            &mut self.assets,
            &mut self.physics,
            false,
        )?;
        let player = self.entities.get_mut(id)?;
        if let Some(handle) = player.body_handle() {
            self.physics.set_sleep_thresholds(handle, 0.01, 1.0);
        }
        if let Some(body) = player.body_mut() {
            // Upright lock: a zero-width range pins every rotation axis
            self.physics.set_global_angle_limit(body, Vec3::ZERO, Vec3::ZERO);
        }
        Some(id)
    }

    pub fn player(&self) -> Option<EntityId> {
        self.player
    }

    fn player_body(&self) -> Option<crate::controller::physics::BodyHandle> {
        self.player
            .and_then(|id| self.entities.get(id))
            .and_then(|e| e.body_handle())
    }

    /// Entities that belong to the engine rather than the scene
    pub fn keep_set(&self) -> HashSet<EntityId> {
        self.player.into_iter().collect()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.viewport = (width, height);
        let shadow_cams: HashSet<String> = self
            .lighting
            .lights()
            .iter()
            .filter_map(|l| l.shadow().map(|s| s.camera.clone()))
            .collect();
        self.cameras
            .set_aspect_where(width, height, |name| !shadow_cams.contains(name));
    }

    /// Replace the world with a saved scene. The player survives.
    pub fn load_scene(&mut self, path: &std::path::Path) -> Result<()> {
        let keep = self.keep_set();
        scene::load_scene(
            path,
            SceneTarget {
                entities: &mut self.entities,
                lighting: &mut self.lighting,
                cameras: &mut self.cameras,
                physics: &mut self.physics,
                assets: &mut self.assets,
                selection: &mut self.selection,
                editor: self.config.editor,
                keep: &keep,
            },
        )
    }

    /// Add a light with an indicator entity at its position
    pub fn add_light(&mut self, light: PhongLight) {
        self.lighting.add_with_indicator(
            light,
            &mut self.entities,
            &mut self.assets,
            &mut self.physics,
            self.config.editor,
        );
    }

    pub fn apply_editor_action(&mut self, action: &EditorAction) -> Result<bool> {
        let keep = self.keep_set();
        let mut ctx = EditorContext {
            entities: &mut self.entities,
            lighting: &mut self.lighting,
            cameras: &mut self.cameras,
            physics: &mut self.physics,
            assets: &mut self.assets,
            selection: &mut self.selection,
            editor: self.config.editor,
            keep: &keep,
        };
        action.apply(&mut ctx)
    }

    // ==================== Picking ====================

    /// World-space direction through a window pixel, from the active camera
    pub fn get_mouse_ray(&self, px: f32, py: f32) -> Option<Vec3> {
        let (w, h) = self.viewport;
        self.cameras
            .active()
            .map(|cam| cam.mouse_ray(px, py, w as f32, h as f32))
    }

    /// Refresh the crosshair target along `dir` from the active camera.
    /// Far hits keep the previous target; misses and ownerless bodies clear it.
    pub fn pick_looking_at(&mut self, dir: Vec3) {
        let Some(origin) = self.cameras.active().map(Camera::eye) else {
            return;
        };
        let far = self.cameras.active().map(|c| c.far).unwrap_or(self.config.far);
        match self.physics.cast_ray(origin, dir, far, self.player_body()) {
            Some(hit) if hit.distance > MAX_PICK_DISTANCE => {}
            Some(hit) => {
                self.selection.looking_at = hit.body.and_then(|b| self.entities.get_by_body(b));
            }
            None => self.selection.looking_at = None,
        }
    }

    /// Editor/paused click selection: a light through its indicator, or an entity
    pub fn pick_selection(&mut self, dir: Vec3) {
        let Some(origin) = self.cameras.active().map(Camera::eye) else {
            return;
        };
        let far = self.cameras.active().map(|c| c.far).unwrap_or(self.config.far);
        let Some(hit) = self.physics.cast_ray(origin, dir, far, self.player_body()) else {
            return;
        };
        let picked = hit.body.and_then(|b| self.entities.get_by_body(b));
        match picked.and_then(|id| self.lighting.get_by_indicator(id)) {
            Some(light) => self.selection.select_light(light, picked),
            None => self.selection.entity = picked,
        }
        debug!(entity = ?self.selection.entity, light = ?self.selection.light, "picked");
    }

    // ==================== Frame ====================

    /// Steps 1-3: route keys and clicks to the GUI or the world, handle pause
    pub fn handle_input(&mut self, input: &mut InputState, ui: &UiResponse, dt: f32) -> FrameOutcome {
        let mut outcome = FrameOutcome::default();
        let (w, h) = self.viewport;

        if self.processor.is_escape(input) && !self.config.editor {
            info!("escape pressed, quitting");
            self.quit = true;
        }

        if let Some((px, py)) = input.take_click() {
            if (self.config.editor || self.paused) && !ui.consumed {
                let grabbed = self
                    .cameras
                    .active()
                    .is_some_and(|c| c.mode == RotationMode::ConstrainedYawPitch);
                let (px, py) = if grabbed {
                    (w as f32 / 2.0, h as f32 / 2.0)
                } else {
                    (px, py)
                };
                if let Some(dir) = self.get_mouse_ray(px, py) {
                    self.pick_selection(dir);
                }
            }
        }

        let (dx, dy) = input.consume_look();
        if !ui.text_focused {
            if !self.paused {
                self.drive_camera(input, dx, dy, dt, &mut outcome);
            }
            if self.processor.wants_to_toggle_phys_debug(input) {
                self.draw_phys_debug = !self.draw_phys_debug;
                self.physics.debug_draw = self.draw_phys_debug;
            }
            if self.processor.wants_to_pause(input) && !self.config.editor {
                self.paused = !self.paused;
                self.overlay = if self.paused { Overlay::Pause } else { Overlay::None };
                info!(paused = self.paused, "pause toggled");
            }
        }

        input.end_frame();
        outcome
    }

    fn drive_camera(
        &mut self,
        input: &mut InputState,
        dx: f32,
        dy: f32,
        dt: f32,
        outcome: &mut FrameOutcome,
    ) {
        let (w, h) = self.viewport;
        let toggle = self.processor.wants_to_toggle_rotation_mode(input);
        let use_pressed = self.processor.wants_to_use(input);

        let Some(name) = self.cameras.active_name().map(str::to_string) else {
            return;
        };
        if let Some(camera) = self.cameras.get_mut(&name) {
            if toggle {
                camera.mode = camera.mode.toggled();
                outcome.grab_cursor = Some(camera.mode == RotationMode::ConstrainedYawPitch);
                info!(mode = ?camera.mode, "camera rotation mode");
            }
            self.controller.apply_look(camera, dx, dy, w as f32, h as f32);
            self.controller.update_rotation(camera, &self.processor, input, dt);
            self.controller.update_movement(
                camera,
                &self.processor,
                input,
                dt,
                &self.entities,
                &mut self.physics,
            );
        }

        if use_pressed {
            self.use_looked_at();
        }
    }

    fn use_looked_at(&mut self) {
        let Some(entity) = self.selection.looking_at.and_then(|id| self.entities.get_mut(id)) else {
            return;
        };
        let mut ctx = ScriptContext {
            paused: &mut self.paused,
            overlay: &mut self.overlay,
        };
        if !entity.use_entity(&mut ctx) {
            debug!("looked-at entity has no on-use script");
        }
    }

    /// Steps 4-6: physics, crosshair pick, camera/entity/script/light updates
    pub fn update(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        let dt = dt.clamp(0.0, MAX_FRAME_DT);
        self.physics.step(dt);

        let (w, h) = self.viewport;
        if let Some(dir) = self.get_mouse_ray(w as f32 / 2.0, h as f32 / 2.0) {
            self.pick_looking_at(dir);
        }

        self.cameras.update(&self.entities, &self.physics);

        let editor = self.config.editor;
        let mut ctx = ScriptContext {
            paused: &mut self.paused,
            overlay: &mut self.overlay,
        };
        if !editor {
            script::run_scripts(&mut self.global_scripts, None, dt, &mut ctx);
        }
        self.entities.update(&self.physics, editor, dt, &mut ctx);

        if let Some(bound) = self
            .cameras
            .active()
            .and_then(|c| c.bound_entity())
            .and_then(|id| self.entities.get_mut(id))
        {
            bound.update(&self.physics);
        }
        self.lighting
            .update(&mut self.entities, &self.physics, &mut self.cameras);
    }

    /// Steps 7-10: shadow passes, scene, debug lines, then the GUI target
    pub fn record(&mut self, sink: &mut dyn DrawSink) -> Result<()> {
        self.lighting.draw_shadows(
            &self.entities,
            &self.physics,
            &mut self.cameras,
            &mut self.shaders,
            sink,
        )?;

        sink.begin_target(RenderTarget::Screen)?;
        if self.cameras.active().is_none() {
            warn!("no active camera, skipping scene draw");
        } else {
            self.shaders.swap_shader(
                NORMAL_SHADER,
                &self.cameras,
                self.lighting.publishable(),
                sink,
            )?;
            let mut exclude = self.lighting.indicators();
            exclude.extend(self.player);
            self.entities.draw(&self.cameras, sink, &exclude)?;
            self.lighting.draw(&self.entities, &self.cameras, sink)?;

            if self.draw_phys_debug {
                self.shaders.swap_shader(
                    PHYS_DEBUG_SHADER,
                    &self.cameras,
                    self.lighting.publishable(),
                    sink,
                )?;
                sink.draw_lines(&self.physics.debug_lines())?;
            }
        }

        sink.begin_target(RenderTarget::Overlay)?;
        self.shaders
            .swap_shader(GUI_SHADER, &self.cameras, self.lighting.publishable(), sink)?;
        Ok(())
    }

    /// One full frame: input, update, record, editor actions, FPS title
    pub fn frame(
        &mut self,
        input: &mut InputState,
        ui: &UiResponse,
        dt: f32,
        sink: &mut dyn DrawSink,
    ) -> Result<FrameOutcome> {
        let mut outcome = self.handle_input(input, ui, dt);
        for action in &ui.actions {
            if let Err(e) = self.apply_editor_action(action) {
                warn!("editor action {:?} failed: {}", action, e);
            }
        }
        self.update(dt);
        self.record(sink)?;
        if let Some(fps) = self.fps.tick(dt) {
            outcome.title = Some(format!("Berilia - FPS: {:.0}", fps));
        }
        Ok(outcome)
    }

    /// Scene light used when nothing was loaded
    pub fn add_default_light(&mut self) {
        self.add_light(PhongLight::point(
            Vec4::new(0.0, 3.0, 0.0, 1.0),
            Vec4::new(0.2, 0.2, 0.2, 1.0),
            Vec4::new(0.8, 0.8, 0.8, 1.0),
            Vec4::new(0.5, 0.5, 0.5, 1.0),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input::{InputEvent, MouseButton};
    use crate::model::entity::test_assets;
    use crate::model::Entity;
    use crate::model::script::{TestUseScript, S_TEST_USE};
    use crate::view::draw::{CommandRecorder, DrawCommand};
    use crate::view::shaders::ShaderKind;
    use approx::assert_relative_eq;
    use winit::keyboard::KeyCode;

    fn game(editor: bool) -> Game {
        let config = EngineConfig {
            editor,
            width: 800,
            height: 600,
            ..Default::default()
        };
        Game::new(config, test_assets())
    }

    fn spawn(game: &mut Game, kind: EntityKind, pos: Vec3) -> EntityId {
        let e = Entity::spawn(
            kind,
            pos,
            Rotation::IDENTITY,
            &mut game.assets,
            &mut game.physics,
            true,
        );
        let id = game.entities.add(e);
        game.physics.sync_queries();
        id
    }

    #[test]
    fn test_startup_binds_player_camera() {
        let g = game(false);
        let player = g.player().unwrap();
        assert_eq!(g.cameras.active_name(), Some(CAM_NORMAL));
        assert_eq!(g.cameras.active().unwrap().bound_entity(), Some(player));
        let body = g.entities.get(player).unwrap().body().unwrap();
        assert!(body.has_angle_limit());
        assert_eq!(g.keep_set().len(), 1);
    }

    #[test]
    fn test_editor_startup_has_free_camera() {
        let g = game(true);
        assert!(g.player().is_none());
        assert!(g.cameras.active().unwrap().bound_entity().is_none());
        assert!(g.entities.is_empty());
    }

    #[test]
    fn test_pick_looking_at_distance_rules() {
        let mut g = game(true);
        let near = spawn(&mut g, EntityKind::Flowerpot, Vec3::new(0.0, 0.0, -2.0));
        g.pick_looking_at(Vec3::NEG_Z);
        assert_eq!(g.selection.looking_at, Some(near));

        // Far hit keeps the previous target
        g.pick_looking_at(Vec3::NEG_Z);
        g.entities.evict(near, &mut g.physics, &mut Selection::default());
        spawn(&mut g, EntityKind::Flowerpot, Vec3::new(0.0, 0.0, -20.0));
        g.pick_looking_at(Vec3::NEG_Z);
        assert_eq!(g.selection.looking_at, Some(near));

        // A miss clears it
        g.pick_looking_at(Vec3::Z);
        assert_eq!(g.selection.looking_at, None);
    }

    #[test]
    fn test_pick_selection_prefers_light_indicator() {
        let mut g = game(true);
        g.add_light(PhongLight::point(
            Vec4::new(0.0, 0.0, -3.0, 1.0),
            Vec4::ONE,
            Vec4::ONE,
            Vec4::ONE,
        ));
        g.physics.sync_queries();
        g.pick_selection(Vec3::NEG_Z);
        assert!(g.selection.light.is_some());
        assert!(g.selection.entity.is_none());
    }

    #[test]
    fn test_pause_swaps_overlay_and_freezes_world() {
        let mut g = game(false);
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::Tab));
        g.handle_input(&mut input, &UiResponse::default(), 0.016);
        assert!(g.paused);
        assert_eq!(g.overlay, Overlay::Pause);

        let body = g.entities.get(g.player().unwrap()).unwrap().body_handle().unwrap();
        let before = g.physics.translation(body);
        g.update(0.5);
        assert_eq!(g.physics.translation(body), before);

        input.process_event(&InputEvent::KeyUp(KeyCode::Tab));
        input.process_event(&InputEvent::KeyDown(KeyCode::Tab));
        g.handle_input(&mut input, &UiResponse::default(), 0.016);
        assert!(!g.paused);
        assert_eq!(g.overlay, Overlay::None);
    }

    #[test]
    fn test_tab_in_text_field_does_not_pause() {
        let mut g = game(false);
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::Tab));
        let typing = UiResponse {
            text_focused: true,
            ..Default::default()
        };
        g.handle_input(&mut input, &typing, 0.016);
        assert!(!g.paused);
        assert_eq!(g.overlay, Overlay::None);
    }

    #[test]
    fn test_escape_quits_only_outside_editor() {
        for (editor, quits) in [(false, true), (true, false)] {
            let mut g = game(editor);
            let mut input = InputState::new();
            input.process_event(&InputEvent::KeyDown(KeyCode::Escape));
            g.handle_input(&mut input, &UiResponse::default(), 0.016);
            assert_eq!(g.quit, quits);
        }
    }

    #[test]
    fn test_use_key_runs_on_use_script() {
        let mut g = game(false);
        let id = spawn(&mut g, EntityKind::Flowerpot, Vec3::new(0.0, 0.0, -2.0));
        {
            let e = g.entities.get_mut(id).unwrap();
            let idx = e.add_script(Box::new(TestUseScript::new("a book")));
            e.set_use_script(idx);
            assert_eq!(e.scripts()[idx].type_name(), S_TEST_USE);
        }
        g.selection.looking_at = Some(id);

        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyF));
        g.handle_input(&mut input, &UiResponse::default(), 0.016);
        assert!(g.paused);
        assert_eq!(g.overlay, Overlay::Book("a book".to_string()));
    }

    #[test]
    fn test_text_focus_blocks_world_keys() {
        let mut g = game(true);
        let before = g.cameras.active().unwrap().clone();
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyH));
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyW));
        let ui = UiResponse {
            text_focused: true,
            ..Default::default()
        };
        g.handle_input(&mut input, &ui, 0.1);
        g.update(0.1);
        let after = g.cameras.active().unwrap();
        assert_eq!(after.rotation_matrix(), before.rotation_matrix());
        assert_eq!(after.eye(), before.eye());
    }

    #[test]
    fn test_click_consumed_by_gui_does_not_pick() {
        let mut g = game(true);
        spawn(&mut g, EntityKind::Flowerpot, Vec3::new(0.0, 0.0, -2.0));
        let mut input = InputState::new();
        input.process_event(&InputEvent::CursorMoved { x: 400.0, y: 300.0 });
        input.process_event(&InputEvent::MouseClick { button: MouseButton::Left, is_down: true });
        let ui = UiResponse {
            consumed: true,
            ..Default::default()
        };
        g.handle_input(&mut input, &ui, 0.016);
        assert!(g.selection.entity.is_none());

        input.process_event(&InputEvent::MouseClick { button: MouseButton::Left, is_down: true });
        g.handle_input(&mut input, &UiResponse::default(), 0.016);
        assert!(g.selection.entity.is_some());
    }

    #[test]
    fn test_record_order_and_restore() {
        let mut g = game(false);
        g.add_light(PhongLight::point(
            Vec4::new(1.0, 2.0, 0.0, 1.0),
            Vec4::ONE,
            Vec4::ONE,
            Vec4::ONE,
        ));
        let light = g.lighting.lights()[0].id();
        assert!(g.lighting.make_shadow_caster(light, &mut g.cameras, &g.entities, &g.physics));
        spawn(&mut g, EntityKind::Flowerpot, Vec3::new(0.0, 0.0, -2.0));
        g.update(0.016);

        let mut rec = CommandRecorder::new();
        g.record(&mut rec).unwrap();
        let cmds = rec.commands();

        let targets: Vec<RenderTarget> = cmds
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Target(t) => Some(*t),
                _ => None,
            })
            .collect();
        assert!(matches!(targets[0], RenderTarget::ShadowLayer(_)));
        assert_eq!(&targets[1..], &[RenderTarget::Screen, RenderTarget::Overlay]);
        assert_eq!(g.cameras.active_name(), Some(CAM_NORMAL));
        assert_eq!(g.shaders.current(), Some(GUI_SHADER));

        // Player is never drawn in the main pass
        let screen_at = cmds
            .iter()
            .position(|c| matches!(c, DrawCommand::Target(RenderTarget::Screen)))
            .unwrap();
        let player_mesh = g.entities.get(g.player().unwrap()).unwrap().mesh().cloned().unwrap();
        let drawn_player = cmds[screen_at..].iter().any(|c| match c {
            DrawCommand::Mesh(d) => std::sync::Arc::ptr_eq(&d.mesh, &player_mesh),
            _ => false,
        });
        assert!(!drawn_player);
        assert!(cmds
            .iter()
            .any(|c| matches!(c, DrawCommand::Shader(ShaderKind::Normal))));
    }

    #[test]
    fn test_phys_debug_toggle_draws_lines() {
        let mut g = game(true);
        spawn(&mut g, EntityKind::Flowerpot, Vec3::ZERO);
        let mut input = InputState::new();
        input.process_event(&InputEvent::KeyDown(KeyCode::KeyP));
        g.handle_input(&mut input, &UiResponse::default(), 0.016);
        assert!(g.draw_phys_debug);

        let mut rec = CommandRecorder::new();
        g.record(&mut rec).unwrap();
        assert!(rec.commands().iter().any(|c| matches!(c, DrawCommand::Lines(l) if !l.is_empty())));
    }

    #[test]
    fn test_fps_title_throttled() {
        let mut fps = FpsCounter::default();
        assert!(fps.tick(0.1).is_none());
        assert!(fps.tick(0.1).is_none());
        let rate = fps.tick(0.1).unwrap();
        assert_relative_eq!(rate, 10.0, epsilon = 1e-3);
    }

    #[test]
    fn test_resize_skips_shadow_cameras() {
        let mut g = game(true);
        g.add_light(PhongLight::point(Vec4::W, Vec4::ONE, Vec4::ONE, Vec4::ONE));
        let light = g.lighting.lights()[0].id();
        g.lighting.make_shadow_caster(light, &mut g.cameras, &g.entities, &g.physics);
        g.resize(1000, 500);
        assert_relative_eq!(g.cameras.get(CAM_NORMAL).unwrap().aspect, 2.0);
        let shadow_cam = g.lighting.get(light).unwrap().shadow().unwrap().camera.clone();
        assert_relative_eq!(g.cameras.get(&shadow_cam).unwrap().aspect, 1.0);
    }
}
