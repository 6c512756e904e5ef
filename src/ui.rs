use egui::Context;
use std::path::PathBuf;

use crate::controller::editor::{Axis, EditorAction, LightChannel, RotationField};
use crate::controller::Game;
use crate::model::script;
use crate::model::{Entity, EntityId, EntityKind, LightId, LightType, PhongLight, RotationMode};

/// Full-screen text shown over the world
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Overlay {
    #[default]
    None,
    Pause,
    /// Text of a readable object, opened by its on-use script
    Book(String),
}

/// What the GUI did with this frame's input
#[derive(Debug, Default, Clone)]
pub struct UiResponse {
    /// The pointer is over a GUI element; clicks must not pick the world
    pub consumed: bool,
    /// A text field has keyboard focus; movement keys must not reach the camera
    pub text_focused: bool,
    pub actions: Vec<EditorAction>,
}

fn num(v: f32) -> String {
    format!("{:.3}", v)
}

fn vec3_fields(v: glam::Vec3) -> [String; 3] {
    [num(v.x), num(v.y), num(v.z)]
}

/// Editable text of the selected entity
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EntityFields {
    pub name: String,
    pub pos: [String; 3],
    pub axis: [String; 3],
    /// Degrees
    pub angle: String,
    pub rotate_by: String,
    pub scale: [String; 3],
    /// (type name, text) per attached script
    pub scripts: Vec<(String, String)>,
    pub use_script: Option<usize>,
}

impl EntityFields {
    pub fn from_entity(entity: &Entity) -> Self {
        let rot = entity.rotation();
        Self {
            name: entity.name.clone(),
            pos: vec3_fields(entity.cur_center()),
            axis: vec3_fields(rot.axis()),
            angle: num(rot.angle().to_degrees()),
            rotate_by: String::from("0"),
            scale: vec3_fields(entity.cur_scale()),
            scripts: entity
                .scripts()
                .iter()
                .map(|s| (s.type_name().to_string(), s.text().unwrap_or_default().to_string()))
                .collect(),
            use_script: entity.use_script_index(),
        }
    }
}

/// Editable text of the selected light
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LightFields {
    pub pos: [String; 3],
    /// Ambient, diffuse, specular; rgba each
    pub colors: [[String; 4]; 3],
    pub specular_exp: String,
    pub falloff: String,
    pub kind: LightType,
    pub dir: [String; 3],
    /// Degrees
    pub spot_angle: String,
    pub cast_shadows: bool,
}

impl LightFields {
    pub fn from_light(light: &PhongLight) -> Self {
        let rgba = |c: glam::Vec4| [num(c.x), num(c.y), num(c.z), num(c.w)];
        Self {
            pos: vec3_fields(light.position()),
            colors: [rgba(light.a), rgba(light.d), rgba(light.s)],
            specular_exp: num(light.specular_exp),
            falloff: num(light.falloff),
            kind: light.kind,
            dir: vec3_fields(light.dir),
            spot_angle: num(light.spot_rads.to_degrees()),
            cast_shadows: light.cast_shadows,
        }
    }
}

/// GUI state that outlives a frame: text buffers and combo choices
#[derive(Debug, Clone)]
pub struct UiState {
    pub save_path: String,
    pub add_kind: EntityKind,
    pub add_script: &'static str,
    /// Path read by "Load text" into a script
    pub text_file: String,
    pub entity: Option<(EntityId, EntityFields)>,
    pub light: Option<(LightId, LightFields)>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            save_path: String::from("scenes/scene.json"),
            add_kind: EntityKind::Flowerpot,
            add_script: script::S_TEST_USE,
            text_file: String::new(),
            entity: None,
            light: None,
        }
    }
}

impl UiState {
    /// Reload the text buffers from the world, unless the user is typing
    /// into one of them for the same selection.
    pub fn sync(&mut self, game: &Game, typing: bool) {
        let entity = game
            .selection
            .entity
            .and_then(|id| game.entities.get(id))
            .map(|e| (e.id(), EntityFields::from_entity(e)));
        let same_entity = self.entity.as_ref().map(|(id, _)| *id) == entity.as_ref().map(|(id, _)| *id);
        if !(typing && same_entity) {
            self.entity = entity;
        }

        let light = game
            .selection
            .light
            .and_then(|id| game.lighting.get(id))
            .map(|l| (l.id(), LightFields::from_light(l)));
        let same_light = self.light.as_ref().map(|(id, _)| *id) == light.as_ref().map(|(id, _)| *id);
        if !(typing && same_light) {
            self.light = light;
        }
    }
}

/// Build the complete UI for one frame
pub fn build_ui(ctx: &Context, game: &Game, state: &mut UiState) -> UiResponse {
    let mut actions = Vec::new();
    state.sync(game, ctx.wants_keyboard_input());

    match &game.overlay {
        Overlay::None => {
            if !game.config.editor {
                draw_crosshair(ctx);
            }
        }
        Overlay::Pause => draw_pause(ctx),
        Overlay::Book(text) => draw_book(ctx, text),
    }
    draw_debug_window(ctx, game);

    if game.config.editor {
        draw_editor_panel(ctx, state, &mut actions);
    }

    UiResponse {
        consumed: ctx.is_pointer_over_area() || ctx.wants_pointer_input(),
        text_focused: ctx.wants_keyboard_input(),
        actions,
    }
}

fn draw_crosshair(ctx: &Context) {
    let painter = ctx.layer_painter(egui::LayerId::new(egui::Order::TOP, egui::Id::new("crosshair")));
    let center = ctx.available_rect().center();
    let size = 10.0;
    let stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);
    painter.line_segment(
        [egui::Pos2::new(center.x - size, center.y), egui::Pos2::new(center.x + size, center.y)],
        stroke,
    );
    painter.line_segment(
        [egui::Pos2::new(center.x, center.y - size), egui::Pos2::new(center.x, center.y + size)],
        stroke,
    );
}

fn draw_pause(ctx: &Context) {
    egui::Area::new(egui::Id::new("pause"))
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.heading(egui::RichText::new("Paused").size(32.0).color(egui::Color32::WHITE));
                ui.label(egui::RichText::new("Tab - Resume, click to select").small());
            });
        });
}

fn draw_book(ctx: &Context, text: &str) {
    egui::Window::new("Book")
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .collapsible(false)
        .resizable(false)
        .default_size([420.0, 320.0])
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.label(text);
            });
            ui.separator();
            ui.label(egui::RichText::new("F - Close").small());
        });
}

fn draw_debug_window(ctx: &Context, game: &Game) {
    egui::Window::new("Debug")
        .default_pos([8.0, 8.0])
        .default_size([160.0, 100.0])
        .show(ctx, |ui| {
            ui.label(egui::RichText::new(format!("FPS: {:.0}", game.fps.fps)).small());
            if let Some(cam) = game.cameras.active() {
                let eye = cam.eye();
                ui.label(egui::RichText::new(format!("Pos: {:.1}, {:.1}, {:.1}", eye.x, eye.y, eye.z)).small());
                let mode = match cam.mode {
                    RotationMode::FreeQuaternion => "free",
                    RotationMode::ConstrainedYawPitch => "grabbed",
                };
                ui.label(egui::RichText::new(format!("Rotation: {}", mode)).small());
            }
            let target = game
                .selection
                .looking_at
                .and_then(|id| game.entities.get(id))
                .map(|e| if e.name.is_empty() { e.type_str().to_string() } else { e.name.clone() });
            if let Some(target) = target {
                ui.label(egui::RichText::new(format!("Looking at: {}", target)).small());
            }
            ui.label(egui::RichText::new(format!("Entities: {}  Lights: {}", game.entities.len(), game.lighting.len())).small());
            ui.separator();
            ui.label(egui::RichText::new("Controls:").small());
            ui.label(egui::RichText::new("WASD / U O - Move  Space - Jump").small());
            ui.label(egui::RichText::new("HJKL / QE - Rotate").small());
            ui.label(egui::RichText::new("B - Rotation mode  V - Stabilize  F - Use").small());
            ui.label(egui::RichText::new("P - Physics debug  Tab - Pause").small());
        });
}

/// Single-line field that emits an action when the user leaves it
fn commit_field(
    ui: &mut egui::Ui,
    label: &str,
    text: &mut String,
    actions: &mut Vec<EditorAction>,
    make: impl FnOnce(String) -> EditorAction,
) {
    ui.horizontal(|ui| {
        ui.label(label);
        let resp = ui.add(egui::TextEdit::singleline(text).desired_width(64.0));
        if resp.lost_focus() {
            actions.push(make(text.clone()));
        }
    });
}

fn draw_editor_panel(ctx: &Context, state: &mut UiState, actions: &mut Vec<EditorAction>) {
    egui::SidePanel::right("editor").default_width(240.0).show(ctx, |ui| {
        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.heading("Scene");
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut state.save_path);
                if ui.button("Save").clicked() {
                    actions.push(EditorAction::SaveScene {
                        path: PathBuf::from(state.save_path.trim()),
                    });
                }
            });
            ui.horizontal(|ui| {
                egui::ComboBox::from_id_salt("add_kind")
                    .selected_text(state.add_kind.type_str())
                    .show_ui(ui, |ui| {
                        for kind in EntityKind::ALL {
                            if matches!(kind, EntityKind::PlayerMesh | EntityKind::LightIndicator) {
                                continue;
                            }
                            ui.selectable_value(&mut state.add_kind, kind, kind.type_str());
                        }
                    });
                if ui.button("Add entity").clicked() {
                    actions.push(EditorAction::AddEntity {
                        type_name: state.add_kind.type_str().to_string(),
                    });
                }
            });
            if ui.button("Add light").clicked() {
                actions.push(EditorAction::AddLight);
            }
            if ui.button("Clear selection").clicked() {
                actions.push(EditorAction::ClearSelection);
            }

            let add_script = &mut state.add_script;
            let text_file = &mut state.text_file;
            if let Some((_, fields)) = state.entity.as_mut() {
                ui.separator();
                entity_section(ui, fields, add_script, text_file, actions);
            }
            if let Some((_, fields)) = state.light.as_mut() {
                ui.separator();
                light_section(ui, fields, actions);
            }
        });
    });
}

fn entity_section(
    ui: &mut egui::Ui,
    fields: &mut EntityFields,
    add_script: &mut &'static str,
    text_file: &mut String,
    actions: &mut Vec<EditorAction>,
) {
    ui.heading("Entity");
    commit_field(ui, "name", &mut fields.name, actions, |name| EditorAction::RenameEntity { name });

    ui.label("Position");
    for axis in Axis::ALL {
        commit_field(ui, axis.label(), &mut fields.pos[axis.index()], actions, |value| {
            EditorAction::SetEntityPosition { axis, value }
        });
    }

    ui.label("Rotation");
    commit_field(ui, "angle", &mut fields.angle, actions, |value| EditorAction::SetEntityRotation {
        field: RotationField::Angle,
        value,
    });
    for axis in Axis::ALL {
        commit_field(ui, axis.label(), &mut fields.axis[axis.index()], actions, |value| {
            EditorAction::SetEntityRotation {
                field: RotationField::Axis(axis),
                value,
            }
        });
    }
    ui.horizontal(|ui| {
        ui.add(egui::TextEdit::singleline(&mut fields.rotate_by).desired_width(64.0));
        if ui.button("Rotate").clicked() {
            actions.push(EditorAction::RotateEntity {
                degrees: fields.rotate_by.clone(),
            });
        }
    });

    ui.label("Scale");
    for axis in Axis::ALL {
        commit_field(ui, axis.label(), &mut fields.scale[axis.index()], actions, |value| {
            EditorAction::SetEntityScale { axis, value }
        });
    }

    ui.label("Scripts");
    ui.horizontal(|ui| {
        ui.label("text file");
        ui.text_edit_singleline(text_file);
    });
    for (index, (type_name, text)) in fields.scripts.iter_mut().enumerate() {
        ui.horizontal(|ui| {
            let is_use = fields.use_script == Some(index);
            if ui.radio(is_use, type_name.as_str()).clicked() && !is_use {
                actions.push(EditorAction::SetUseScript { index });
            }
            if ui.button("Load text").clicked() && !text_file.trim().is_empty() {
                actions.push(EditorAction::LoadScriptText {
                    index,
                    path: PathBuf::from(text_file.trim()),
                });
            }
        });
        if ui.text_edit_multiline(text).lost_focus() {
            actions.push(EditorAction::SetScriptText {
                index,
                text: text.clone(),
            });
        }
    }
    ui.horizontal(|ui| {
        egui::ComboBox::from_id_salt("add_script")
            .selected_text(*add_script)
            .show_ui(ui, |ui| {
                for name in script::script_types() {
                    ui.selectable_value(add_script, *name, *name);
                }
            });
        if ui.button("Add script").clicked() {
            actions.push(EditorAction::AddScript {
                type_name: add_script.to_string(),
            });
        }
    });

    if ui.button("Delete entity").clicked() {
        actions.push(EditorAction::DeleteEntity);
    }
}

fn light_section(ui: &mut egui::Ui, fields: &mut LightFields, actions: &mut Vec<EditorAction>) {
    ui.heading("Light");
    ui.label("Position");
    for axis in Axis::ALL {
        commit_field(ui, axis.label(), &mut fields.pos[axis.index()], actions, |value| {
            EditorAction::SetLightPosition { axis, value }
        });
    }

    let channels = [
        (LightChannel::Ambient, "Ambient"),
        (LightChannel::Diffuse, "Diffuse"),
        (LightChannel::Specular, "Specular"),
    ];
    for (slot, (channel, label)) in channels.into_iter().enumerate() {
        ui.label(label);
        for (component, name) in ["r", "g", "b", "a"].into_iter().enumerate() {
            commit_field(ui, name, &mut fields.colors[slot][component], actions, |value| {
                EditorAction::SetLightColor {
                    channel,
                    component,
                    value,
                }
            });
        }
    }
    commit_field(ui, "specular exp", &mut fields.specular_exp, actions, |value| {
        EditorAction::SetSpecularExp { value }
    });
    commit_field(ui, "falloff", &mut fields.falloff, actions, |value| EditorAction::SetFalloff { value });

    ui.horizontal(|ui| {
        for (kind, label) in [(LightType::Point, "Point"), (LightType::Spot, "Spot")] {
            if ui.radio(fields.kind == kind, label).clicked() && fields.kind != kind {
                actions.push(EditorAction::SetLightType { kind });
            }
        }
    });
    if fields.kind == LightType::Spot {
        ui.label("Direction");
        for axis in Axis::ALL {
            commit_field(ui, axis.label(), &mut fields.dir[axis.index()], actions, |value| {
                EditorAction::SetSpotDirection { axis, value }
            });
        }
        commit_field(ui, "angle", &mut fields.spot_angle, actions, |degrees| {
            EditorAction::SetSpotAngle { degrees }
        });
    }

    if ui.checkbox(&mut fields.cast_shadows, "Cast shadows").changed() {
        actions.push(EditorAction::ToggleShadows);
    }
    if ui.button("Delete light").clicked() {
        actions.push(EditorAction::DeleteLight);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::model::entity::test_assets;
    use crate::model::Rotation;
    use glam::{Vec3, Vec4};

    fn editor_game() -> Game {
        let config = EngineConfig {
            editor: true,
            ..Default::default()
        };
        Game::new(config, test_assets())
    }

    fn run(ctx: &Context, game: &Game, state: &mut UiState) -> UiResponse {
        let mut response = UiResponse::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            response = build_ui(ctx, game, state);
        });
        response
    }

    #[test]
    fn test_sync_loads_selected_entity() {
        let mut game = editor_game();
        let id = game
            .entities
            .add_by_type(
                "u_flowerpot",
                Vec3::new(1.0, 2.0, 3.0),
                Rotation::IDENTITY,
                &mut game.assets,
                &mut game.physics,
                true,
            )
            .unwrap();
        game.selection.entity = Some(id);

        let mut state = UiState::default();
        state.sync(&game, false);
        let (sel, fields) = state.entity.clone().unwrap();
        assert_eq!(sel, id);
        assert_eq!(fields.pos, ["1.000", "2.000", "3.000"]);
        assert_eq!(fields.scale, ["1.000", "1.000", "1.000"]);
        assert!(state.light.is_none());
    }

    #[test]
    fn test_sync_keeps_buffers_while_typing() {
        let mut game = editor_game();
        game.add_light(PhongLight::point(Vec4::W, Vec4::ONE, Vec4::ONE, Vec4::ONE));
        game.selection.light = Some(game.lighting.lights()[0].id());

        let mut state = UiState::default();
        state.sync(&game, false);
        state.light.as_mut().unwrap().1.falloff = String::from("abc");

        state.sync(&game, true);
        assert_eq!(state.light.as_ref().unwrap().1.falloff, "abc");
        state.sync(&game, false);
        assert_ne!(state.light.as_ref().unwrap().1.falloff, "abc");
    }

    #[test]
    fn test_idle_frame_emits_no_actions() {
        let game = editor_game();
        let ctx = Context::default();
        let mut state = UiState::default();
        let response = run(&ctx, &game, &mut state);
        assert!(response.actions.is_empty());
        assert!(!response.text_focused);
    }

    #[test]
    fn test_overlays_build_outside_editor() {
        let mut game = Game::new(EngineConfig::default(), test_assets());
        let ctx = Context::default();
        let mut state = UiState::default();
        for overlay in [Overlay::None, Overlay::Pause, Overlay::Book("notes".into())] {
            game.overlay = overlay;
            let response = run(&ctx, &game, &mut state);
            assert!(response.actions.is_empty());
        }
        assert!(state.entity.is_none());
    }

    #[test]
    fn test_light_fields_report_degrees() {
        let light = PhongLight::spot(
            Vec4::W,
            Vec4::ONE,
            Vec4::ONE,
            Vec4::ONE,
            Vec3::NEG_Y,
            std::f32::consts::FRAC_PI_4,
        );
        let fields = LightFields::from_light(&light);
        assert_eq!(fields.kind, LightType::Spot);
        assert_eq!(fields.spot_angle, "45.000");
        assert_eq!(fields.dir, ["0.000", "-1.000", "0.000"]);
    }
}
