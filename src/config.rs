use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Vertical placement policy of the geometry normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPolicy {
    /// Center on X and Z, rest the lowest point on the ground plane.
    #[default]
    GroundPlane,
    /// Center on all three axes.
    Centered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub target_size: f32,
    pub fit_policy: FitPolicy,
    pub camera_index: u32,
    pub capture_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            target_size: 3.0,
            fit_policy: FitPolicy::default(),
            camera_index: 0,
            capture_dir: PathBuf::from("."),
        }
    }
}

impl ViewerConfig {
    /// Missing or broken config files never abort startup.
    pub fn load_or_default(path: &Path) -> ViewerConfig {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return ViewerConfig::default(),
        };

        match serde_json::from_str::<ViewerConfig>(&contents) {
            Ok(config) => config.sanitized(path),
            Err(error) => {
                log::warn!("Ignoring malformed config {}: {}", path.display(), error);
                ViewerConfig::default()
            }
        }
    }

    fn sanitized(mut self, path: &Path) -> ViewerConfig {
        if !self.target_size.is_finite() || !(0.1..=100.0).contains(&self.target_size) {
            log::warn!(
                "Ignoring out of range target_size {} in {}",
                self.target_size,
                path.display()
            );
            self.target_size = ViewerConfig::default().target_size;
        }

        self
    }
}
