// CONTROLLER: Input, physics, editor actions and the frame pipeline
pub mod camera_controller;
pub mod editor;
pub mod frame_loop;
pub mod input;
pub mod physics;

pub use camera_controller::CameraController;
pub use editor::{EditorAction, EditorContext};
pub use frame_loop::{
    CameraUniform, FrameOutcome, Game, ShadowSlot, TransformUniform, WorldUniform,
};
pub use input::{InputProcessor, InputState};
pub use physics::PhysicsManager;
