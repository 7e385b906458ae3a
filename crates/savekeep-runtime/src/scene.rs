// ABOUTME: Interface to whatever owns scene/level transitions, plus a trivial in-process implementation.
// ABOUTME: Loads start a transition and then poll `transition_complete` until it reports done.

use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("unknown scene: {0}")]
    UnknownScene(String),

    #[error("scene transition failed: {0}")]
    Failed(String),
}

pub trait SceneController: Send + Sync {
    /// Identifier of the scene currently active.
    fn active_scene(&self) -> String;

    /// Start switching to `scene`. Completion is observed through `transition_complete`.
    fn begin_transition(&self, scene: &str) -> Result<(), SceneError>;

    fn transition_complete(&self) -> bool;
}

/// True when restoring a save made in `saved` requires leaving `current`.
pub fn transition_needed(current: &str, saved: &str) -> bool {
    !saved.is_empty() && saved != current
}

/// A scene controller with a single named scene that switches instantly.
#[derive(Debug)]
pub struct StaticScene {
    name: Mutex<String>,
}

impl StaticScene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Mutex::new(name.into()),
        }
    }
}

impl SceneController for StaticScene {
    fn active_scene(&self) -> String {
        self.name
            .lock()
            .map(|n| n.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn begin_transition(&self, scene: &str) -> Result<(), SceneError> {
        if scene.is_empty() {
            return Err(SceneError::UnknownScene(String::new()));
        }
        let mut name = self.name.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!(from = %name, to = scene, "switching scene");
        *name = scene.to_string();
        Ok(())
    }

    fn transition_complete(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_needed_only_for_a_different_named_scene() {
        assert!(transition_needed("Town", "Dungeon"));
        assert!(!transition_needed("Town", "Town"));
        assert!(!transition_needed("Town", ""));
    }

    #[test]
    fn static_scene_switches_immediately() {
        let scene = StaticScene::new("Town");
        assert_eq!(scene.active_scene(), "Town");

        scene.begin_transition("Dungeon").unwrap();
        assert!(scene.transition_complete());
        assert_eq!(scene.active_scene(), "Dungeon");

        assert!(scene.begin_transition("").is_err());
    }
}
