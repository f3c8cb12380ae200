//! Participants and their submitted controller code.
//!
//! A participant is a submission identified by an id plus an `owner/repo`
//! source repository. The controller code is cloned into an ephemeral
//! working directory under `controllers/` which is removed at the end of the
//! match regardless of outcome.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::git;

/// Language recorded when the profile omits one.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Structured metadata shipped by the submission as
/// `controllers/participant/participant.json`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Profile {
    /// Display name shown on the leaderboard.
    #[serde(default)]
    pub name: String,
    /// Free-form description of the controller.
    #[serde(default)]
    pub description: String,
    /// Two-letter country code, or the `"demo"` sentinel for house entries.
    #[serde(default)]
    pub country: String,
    /// Implementation language of the controller.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            name: String::new(),
            description: String::new(),
            country: String::new(),
            language: default_language(),
        }
    }
}

impl Profile {
    /// Reads a profile file, tolerating its absence.
    ///
    /// A missing file yields an empty profile (demo entries predate the
    /// profile format); a present but unparsable file is an error so that a
    /// broken submission is reported rather than ranked nameless.
    pub fn load(path: &Path) -> anyhow::Result<Profile> {
        if !path.is_file() {
            warn!("no profile at {}", path.display());
            return Ok(Profile::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid profile {}", path.display()))
    }
}

/// A submission taking part in a match, with its cloned controller code.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Stable unique identifier.
    pub id: String,
    /// Source location in `owner/repo` form.
    pub repository: String,
    /// Ephemeral working directory holding the cloned controller.
    pub controller_dir: PathBuf,
    /// Leaderboard metadata from the cloned repository.
    pub profile: Profile,
    /// Link to the run's log; only set for the submission actually evaluated.
    pub log_url: Option<String>,
}

impl Participant {
    /// Clones `repository` into `controllers/<id>` and loads its profile.
    #[instrument(skip(token))]
    pub fn fetch(id: &str, repository: &str, token: &str) -> anyhow::Result<Participant> {
        let controller_dir = Path::new("controllers").join(id);
        println!("Cloning {repository} repository...");
        git::clone(&git::authenticated_url(repository, token), &controller_dir)
            .with_context(|| format!("could not clone {repository}"))?;
        let profile = Profile::load(
            &controller_dir
                .join("controllers")
                .join("participant")
                .join("participant.json"),
        )?;
        info!(id, repository, ?profile, "cloning complete");

        Ok(Participant {
            id: id.to_string(),
            repository: repository.to_string(),
            controller_dir,
            profile,
            log_url: None,
        })
    }

    /// Attaches the CI log link to this participant.
    pub fn with_log_url(mut self, log_url: Option<String>) -> Self {
        self.log_url = log_url;
        self
    }

    /// Path of the Dockerfile describing the controller image.
    pub fn dockerfile(&self) -> PathBuf {
        self.controller_dir.join("controller_Dockerfile")
    }

    /// Removes the cloned working directory. Best-effort; failure is logged,
    /// not fatal.
    pub fn remove_working_dir(&self) {
        if self.controller_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.controller_dir) {
                warn!("could not remove {}: {e}", self.controller_dir.display());
            }
        }
    }
}
