//! Runner behavior flags and CI inputs.
//!
//! Two distinct things are configured here:
//!
//! - [`Configuration`]: how the runner itself behaves (verbosity, logging,
//!   pushing, GPU passthrough). Built programmatically or from environment
//!   variables with [`Configuration::from_env()`].
//! - [`Inputs`]: the per-run CI inputs (which submission to evaluate, the
//!   access token, optional friendly-game target). These used to be read
//!   lazily all over the scripts; they are collected once into an explicit
//!   struct instead.
//!
//! # Environment Variables
//!
//! - `RUNNER_VERBOSE` — print container output to stdout (default: `true`)
//! - `RUNNER_LOG` — write a tracing log file (default: `false`)
//! - `INPUT_ALLOW_PUSH` — push updated ranking/animations back (default: `false`)
//! - `RUNNER_GPU` — `true`/`false` to force GPU passthrough on or off;
//!   unset means autodetect
//! - `INPUT_INDIVIDUAL_EVALUATION` — `<id>:<owner>/<repo>` of the submission
//! - `INPUT_REPO_TOKEN` — token used for clones and pushes
//! - `DEFAULT_CONTROLLER` — controller name replaced by `<extern>` in the world
//! - `INPUT_FRIENDLY_OPPONENT` — opponent id for an unranked friendly game
//! - `INPUT_LOG_URL` — link to this run's log, recorded on the ranking entry
//! - `GITHUB_ACTOR` / `GITHUB_REPOSITORY` — push identity and target

use anyhow::Context;

/// Behavior flags for the runner.
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) allow_push: bool,
    /// `None` means "detect at match time".
    pub(crate) gpu: Option<bool>,
}

impl Configuration {
    /// Create a configuration with default parameters.
    ///
    /// By default the runner prints container output, does not write a log
    /// file, does not push results back and autodetects GPU support.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            allow_push: false,
            gpu: None,
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// Unset or unrecognized values fall back to the defaults of
    /// [`Configuration::new`]; flags are case-insensitive `"true"`.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let gpu = std::env::var("RUNNER_GPU")
            .ok()
            .map(|val| val.eq_ignore_ascii_case("true"));

        Self {
            verbose: get_env_flag("RUNNER_VERBOSE", true),
            log: get_env_flag("RUNNER_LOG", false),
            allow_push: get_env_flag("INPUT_ALLOW_PUSH", false),
            gpu,
        }
    }

    /// Enable or disable printing of container output.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to a file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Enable or disable pushing results back to the repository.
    pub fn with_allow_push(mut self, value: bool) -> Self {
        self.allow_push = value;
        self
    }

    /// Force GPU passthrough on or off instead of autodetecting.
    pub fn with_gpu(mut self, value: bool) -> Self {
        self.gpu = Some(value);
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-run CI inputs, collected once at startup.
#[derive(Debug, Clone)]
pub struct Inputs {
    /// Stable identifier of the evaluated submission.
    pub participant_id: String,
    /// Source location in `owner/repo` form.
    pub repository: String,
    /// Token used for authenticated clones and pushes.
    pub repo_token: String,
    /// Controller name the world file references by default.
    pub default_controller: String,
    /// When set, run one unranked match against this opponent id.
    pub friendly_opponent: Option<String>,
    /// Link to this run's log, if the CI exposes one.
    pub log_url: Option<String>,
    /// Identity used for the result commit.
    pub pusher: String,
    /// `owner/repo` the results are pushed to.
    pub push_repository: Option<String>,
}

impl Inputs {
    /// Collects all run inputs from the environment.
    ///
    /// # Errors
    ///
    /// Fails when a mandatory variable is missing or when
    /// `INPUT_INDIVIDUAL_EVALUATION` is not of the `<id>:<owner>/<repo>` form.
    pub fn from_env() -> anyhow::Result<Inputs> {
        let evaluation = std::env::var("INPUT_INDIVIDUAL_EVALUATION")
            .context("INPUT_INDIVIDUAL_EVALUATION is not set")?;
        let (participant_id, repository) = parse_evaluation(&evaluation)?;

        Ok(Inputs {
            participant_id,
            repository,
            repo_token: std::env::var("INPUT_REPO_TOKEN").context("INPUT_REPO_TOKEN is not set")?,
            default_controller: std::env::var("DEFAULT_CONTROLLER")
                .context("DEFAULT_CONTROLLER is not set")?,
            friendly_opponent: non_empty(std::env::var("INPUT_FRIENDLY_OPPONENT").ok()),
            log_url: non_empty(std::env::var("INPUT_LOG_URL").ok()),
            pusher: std::env::var("GITHUB_ACTOR").unwrap_or_else(|_| "competition-runner".into()),
            push_repository: std::env::var("GITHUB_REPOSITORY").ok(),
        })
    }
}

/// Splits `<id>:<owner>/<repo>` into its two halves.
pub fn parse_evaluation(input: &str) -> anyhow::Result<(String, String)> {
    let (id, repository) = input
        .split_once(':')
        .with_context(|| format!("expected `<id>:<owner>/<repo>`, got {input:?}"))?;
    let repository = repository.trim();
    if id.is_empty() || !repository.contains('/') {
        anyhow::bail!("expected `<id>:<owner>/<repo>`, got {input:?}");
    }
    Ok((id.to_string(), repository.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_input_is_split_on_first_colon() {
        let (id, repo) = parse_evaluation("R2D2:cyberbotics/competitor-repo ").unwrap();
        assert_eq!(id, "R2D2");
        assert_eq!(repo, "cyberbotics/competitor-repo");
    }

    #[test]
    fn malformed_evaluation_input_is_rejected() {
        assert!(parse_evaluation("no-colon-here").is_err());
        assert!(parse_evaluation(":cyberbotics/repo").is_err());
        assert!(parse_evaluation("id:not-a-repo").is_err());
    }
}
