//! Temporary world-file rewrite for a recorded run.
//!
//! For the duration of one match the scenario world is mutated in place: the
//! default controller is swapped for `<extern>` so the containerized
//! controller can take over, and the animation-recorder supervisor is
//! appended. The original content is restored when the patch guard drops,
//! whatever the match outcome.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, trace};

use crate::scenario::WorldConfig;
use crate::storage::TMP_ANIMATION_DIRECTORY;

/// Guard holding the original world content; restores it on drop.
#[derive(Debug)]
pub struct WorldPatch {
    path: PathBuf,
    original: String,
}

impl WorldPatch {
    /// Rewrites the world file for a recorded run of `controller_name`.
    pub fn apply(
        world: &WorldConfig,
        default_controller: &str,
        controller_name: &str,
    ) -> anyhow::Result<WorldPatch> {
        let original = std::fs::read_to_string(&world.file)
            .with_context(|| format!("cannot read world file {}", world.file.display()))?;

        let extern_controller = original.replace(
            &format!("controller \"{default_controller}\""),
            "controller \"<extern>\"",
        );
        let patched = extern_controller
            + &recorder_vrml(world.max_duration, TMP_ANIMATION_DIRECTORY, controller_name);

        std::fs::write(&world.file, patched)
            .with_context(|| format!("cannot rewrite world file {}", world.file.display()))?;
        trace!("patched world file {}", world.file.display());

        Ok(WorldPatch {
            path: world.file.clone(),
            original,
        })
    }
}

impl Drop for WorldPatch {
    fn drop(&mut self) {
        if let Err(e) = std::fs::write(&self.path, &self.original) {
            // the repository copy is now dirty; the next checkout fixes it
            error!("could not restore world file {}: {e}", self.path.display());
        }
    }
}

/// VRML snippet declaring the animation-recorder supervisor.
fn recorder_vrml(duration: f64, output: &str, controller_name: &str) -> String {
    format!(
        "DEF ANIMATION_RECORDER_SUPERVISOR Robot {{\n\
         \x20 name \"animation_recorder_supervisor\"\n\
         \x20 controller \"animator\"\n\
         \x20 controllerArgs [\n\
         \x20   \"--duration={duration}\"\n\
         \x20   \"--output={output}\"\n\
         \x20   \"--controller={controller_name}\"\n\
         \x20 ]\n\
         \x20 supervisor TRUE\n\
         }}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_declaration_carries_all_arguments() {
        let vrml = recorder_vrml(30.0, "tmp/animation", "competitor_7_alice");
        assert!(vrml.contains("\"--duration=30\""));
        assert!(vrml.contains("\"--output=tmp/animation\""));
        assert!(vrml.contains("\"--controller=competitor_7_alice\""));
        assert!(vrml.contains("supervisor TRUE"));
    }
}
