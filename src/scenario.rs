//! Scenario configuration loaded from `webots.yaml` / `webots.yml`.
//!
//! The scenario file sits at the root of the competition repository and
//! selects the run mode plus the world parameters handed to the simulator:
//!
//! ```yaml
//! type: competition
//! world:
//!   file: worlds/robot_programming.wbt
//!   max-duration: 120
//!   metric: ranking
//!   higher-is-better: "true"
//!   cpus: 1
//! ```
//!
//! `higher-is-better` historically appears both as a plain boolean and as a
//! quoted string; both spellings are accepted.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Deserializer};

/// File names probed (in order) in the working directory.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["webots.yaml", "webots.yml"];

/// Parsed content of the scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// Run mode discriminator.
    #[serde(rename = "type")]
    pub kind: ScenarioKind,
    /// World parameters handed to the simulator.
    pub world: WorldConfig,
}

/// Top-level `type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    /// Single submission scored independently.
    Benchmark,
    /// Single submission evaluated against the shared ladder.
    Competition,
}

/// The `world` section of the scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// Path of the world description consumed by the simulator.
    pub file: PathBuf,
    /// Wall-clock duration limit enforced by the simulator, in seconds.
    #[serde(rename = "max-duration")]
    pub max_duration: f64,
    /// What the performance value measures.
    pub metric: Metric,
    /// Score ordering direction.
    #[serde(
        rename = "higher-is-better",
        default = "default_true",
        deserialize_with = "stringly_bool"
    )]
    pub higher_is_better: bool,
    /// Optional cap on the CPU budget of each controller container.
    #[serde(default)]
    pub cpus: Option<usize>,
    /// Explicit timeout policy; defaults per metric when absent.
    #[serde(rename = "on-timeout", default)]
    pub on_timeout: Option<TimeoutPolicy>,
}

/// Performance metric reported by the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Metric {
    /// Survival time in seconds; reaching the duration ceiling is a success.
    #[serde(rename = "time", alias = "time-duration")]
    Time,
    /// Completion time in seconds; lower is better.
    #[serde(rename = "time-speed")]
    TimeSpeed,
    /// Completion ratio in `[0, 1]`.
    #[serde(rename = "percent")]
    Percent,
    /// Travelled distance in meters.
    #[serde(rename = "distance")]
    Distance,
    /// Win/lose ladder duels; the persisted value is the rank itself.
    #[serde(rename = "ranking")]
    Ranking,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Metric::Time => "time",
            Metric::TimeSpeed => "time-speed",
            Metric::Percent => "percent",
            Metric::Distance => "distance",
            Metric::Ranking => "ranking",
        };
        write!(f, "{s}")
    }
}

/// What a simulator-side timeout means for the run.
///
/// Historical revisions of the tooling disagreed on this, so the policy is
/// explicit and configurable instead of guessed from the metric alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutPolicy {
    /// Report `max-duration` as a valid terminal score.
    ScoreCeiling,
    /// The timeout is a fatal error for the whole run.
    Fail,
}

impl WorldConfig {
    /// Effective timeout policy: the explicit `on-timeout` key, or the
    /// metric-derived default (`score-ceiling` only when longer survival is
    /// the point of the scenario).
    pub fn timeout_policy(&self) -> TimeoutPolicy {
        self.on_timeout.unwrap_or(match self.metric {
            Metric::Time => TimeoutPolicy::ScoreCeiling,
            _ => TimeoutPolicy::Fail,
        })
    }
}

impl ScenarioConfig {
    /// Loads the scenario from `webots.yaml` (or `webots.yml`) in `dir`.
    ///
    /// # Errors
    ///
    /// Fails when no scenario file exists, when the YAML is invalid or when
    /// the `type` discriminator is missing: nothing gets built in that case.
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<ScenarioConfig> {
        let dir = dir.as_ref();
        for name in CONFIG_FILE_NAMES {
            let path = dir.join(name);
            if path.is_file() {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?;
                return Self::parse(&text)
                    .with_context(|| format!("invalid scenario file {}", path.display()));
            }
        }
        bail!("cannot load `webots.yaml`: no scenario file found in {dir:?}");
    }

    /// Parses a scenario document from YAML text.
    pub fn parse(text: &str) -> anyhow::Result<ScenarioConfig> {
        serde_yaml::from_str(text).context("invalid YAML scenario")
    }
}

fn default_true() -> bool {
    true
}

// Accepts `true`, `"true"`, `"True"`... The quoted form predates typed parsing.
fn stringly_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::String(s) => s.eq_ignore_ascii_case("true"),
    })
}
