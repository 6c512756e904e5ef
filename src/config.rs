use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;

pub const DEFAULT_NEAR: f32 = 0.1;
pub const DEFAULT_FAR: f32 = 1000.0;
pub const DEFAULT_FOV_DEG: f32 = 50.625;

/// Command line arguments
#[derive(Debug, Clone, Parser)]
#[command(name = "berilia")]
#[command(about = "First-person 3D engine with physics and a level editor")]
pub struct Args {
    /// Start in level-editor mode (all entities immobile, no scripts)
    #[arg(short, long)]
    pub editor: bool,

    /// Convert a mesh file to the JSON intermediate format and exit
    #[arg(short, long, num_args = 2, value_names = ["MESH", "JSON"])]
    pub convert: Option<Vec<PathBuf>>,

    /// Load a saved scene at startup
    #[arg(short, long, value_name = "SCENE")]
    pub load: Option<PathBuf>,

    /// Window width
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Window height
    #[arg(long, default_value_t = 720)]
    pub height: u32,
}

/// Runtime configuration shared by the engine subsystems
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub editor: bool,
    pub width: u32,
    pub height: u32,
    pub near: f32,
    pub far: f32,
    pub fov_deg: f32,
    pub asset_root: PathBuf,
    pub scene: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            editor: false,
            width: 1280,
            height: 720,
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            fov_deg: DEFAULT_FOV_DEG,
            asset_root: PathBuf::from("."),
            scene: None,
        }
    }
}

impl EngineConfig {
    pub fn from_args(args: &Args) -> Self {
        // BERILIA_ASSETS overrides the asset root (default: working directory)
        let asset_root = env::var("BERILIA_ASSETS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Self {
            editor: args.editor,
            width: args.width.max(1),
            height: args.height.max(1),
            asset_root,
            scene: args.load.clone(),
            ..Default::default()
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn asset_path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.asset_root.join(relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert_pair() {
        let args = Args::try_parse_from(["berilia", "-c", "in.obj", "out.json"]).unwrap();
        let pair = args.convert.unwrap();
        assert_eq!(pair, vec![PathBuf::from("in.obj"), PathBuf::from("out.json")]);
        assert!(!args.editor);
    }

    #[test]
    fn test_parse_editor_and_scene() {
        let args = Args::try_parse_from(["berilia", "-e", "-l", "scenes/lab.json"]).unwrap();
        let config = EngineConfig::from_args(&args);
        assert!(config.editor);
        assert_eq!(config.scene, Some(PathBuf::from("scenes/lab.json")));
        assert_eq!((config.width, config.height), (1280, 720));
    }

    #[test]
    fn test_convert_requires_two_paths() {
        assert!(Args::try_parse_from(["berilia", "-c", "only_one.obj"]).is_err());
    }
}
