// MODEL: Entities, cameras, lights and scene data
pub mod assets;
pub mod camera;
pub mod camera_manager;
pub mod entity;
pub mod entity_manager;
pub mod lighting;
pub mod rotation;
pub mod scene;
pub mod script;

pub use assets::AssetStore;
pub use camera::{Camera, RotationMode};
pub use camera_manager::CameraManager;
pub use entity::{Entity, EntityId, EntityKind};
pub use entity_manager::{EntityManager, Selection};
pub use lighting::{LightId, LightType, LightingManager, PhongLight};
pub use rotation::Rotation;
pub use scene::SceneFile;
