//! Animation artifact relocation and workspace cleanup.
//!
//! The simulator drops its recording into `tmp/animation`; after the match
//! the files move to a per-participant directory under `storage/` with
//! normalized names the ranking website expects (`animation.json`,
//! `scene.x3d`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, instrument, warn};

/// Where the simulator container's recording is bind-mounted on the host.
pub const TMP_ANIMATION_DIRECTORY: &str = "tmp/animation";

/// Where the bundled recorder supervisor controller ships with the runner.
pub const ANIMATOR_SOURCE_DIRECTORY: &str = "animator";
/// Where the simulator project expects the recorder controller.
pub const ANIMATOR_CONTROLLER_DIRECTORY: &str = "controllers/animator";

/// Guard placing the recorder controller into the simulator project for one
/// match; the copy is removed on drop so it never leaks into the pushed
/// repository.
///
/// The patched world declares a supervisor running the `animator`
/// controller, so the directory must exist before the recorder image is
/// built.
#[derive(Debug)]
pub struct AnimatorDeployment {
    destination: PathBuf,
}

impl AnimatorDeployment {
    /// Copies the bundled recorder controller into `controllers/animator`.
    pub fn deploy() -> anyhow::Result<AnimatorDeployment> {
        AnimatorDeployment::deploy_from(
            Path::new(ANIMATOR_SOURCE_DIRECTORY),
            Path::new(ANIMATOR_CONTROLLER_DIRECTORY),
        )
    }

    fn deploy_from(source: &Path, destination: &Path) -> anyhow::Result<AnimatorDeployment> {
        copy_dir(source, destination).context("cannot deploy the recorder controller")?;
        Ok(AnimatorDeployment {
            destination: destination.to_path_buf(),
        })
    }
}

impl Drop for AnimatorDeployment {
    fn drop(&mut self) {
        remove_dir_if_exists(&self.destination);
    }
}

/// Moves the freshly recorded animation into `storage/wb_animation_<id>`.
///
/// Replaces the participant's previous recording, then normalizes the file
/// names: `.html`/`.css` viewer scaffolding is dropped, the data files are
/// renamed to `animation.json` and `scene.x3d`.
#[instrument]
pub fn store_animation(participant_id: &str) -> anyhow::Result<()> {
    let destination = Path::new("storage").join(format!("wb_animation_{participant_id}"));
    remove_dir_if_exists(&destination);
    copy_dir(Path::new(TMP_ANIMATION_DIRECTORY), &destination)
        .context("no animation recorded")?;
    remove_dir_if_exists(Path::new(TMP_ANIMATION_DIRECTORY));
    cleanup_storage_files(&destination)?;
    info!("stored animation in {}", destination.display());
    Ok(())
}

fn cleanup_storage_files(directory: &Path) -> anyhow::Result<()> {
    if !directory.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(directory)? {
        let path = entry?.path();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        match extension {
            "html" | "css" => std::fs::remove_file(&path)
                .with_context(|| format!("cannot remove {}", path.display()))?,
            "json" => rename_into(&path, directory.join("animation.json"))?,
            "x3d" => rename_into(&path, directory.join("scene.x3d"))?,
            _ => {}
        }
    }
    Ok(())
}

fn rename_into(from: &Path, to: PathBuf) -> anyhow::Result<()> {
    if from == to.as_path() {
        return Ok(());
    }
    std::fs::rename(from, &to)
        .with_context(|| format!("cannot rename {} to {}", from.display(), to.display()))
}

/// Removes the transient match directories (`tmp/` plus the cloned
/// controllers). Runs at end of match regardless of outcome.
pub fn remove_match_leftovers(controller_dirs: &[&Path]) {
    remove_dir_if_exists(Path::new("tmp"));
    for dir in controller_dirs {
        remove_dir_if_exists(dir);
    }
}

/// Best-effort recursive removal.
pub fn remove_dir_if_exists(directory: &Path) {
    if directory.exists() {
        if let Err(e) = std::fs::remove_dir_all(directory) {
            warn!("could not remove {}: {e}", directory.display());
        }
    }
}

/// Recursive copy, preserving the layout.
pub fn copy_dir(source: &Path, destination: &Path) -> anyhow::Result<()> {
    if !source.exists() {
        anyhow::bail!("{} is missing", source.display());
    }
    std::fs::create_dir_all(destination)
        .with_context(|| format!("cannot create {}", destination.display()))?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)
                .with_context(|| format!("cannot copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}
