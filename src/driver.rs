//! The end-to-end run: one invocation, one submission evaluated.
//!
//! The driver owns the sequencing around matches: loading the scenario and
//! the ranking store, cloning the submission, picking opponents, applying
//! results, relocating the animation artifact and pushing everything back.
//! It never parses simulator output itself; that is [`match_runner`]'s job.
//!
//! [`match_runner`]: crate::match_runner

use anyhow::{bail, Context};
use tracing::{info, instrument, warn};

use crate::configuration::{Configuration, Inputs};
use crate::git;
use crate::logger;
use crate::match_runner::{self, MatchFailure, MatchSetup, MatchVerdict};
use crate::milestones;
use crate::participant::Participant;
use crate::ranking::{MatchResult, RankingStore};
use crate::scenario::{Metric, ScenarioConfig, ScenarioKind, TimeoutPolicy};
use crate::storage;

/// File holding the persisted ranking, at the competition repository root.
pub const RANKING_FILE: &str = "participants.json";

/// Runs one submission through the configured scenario.
#[derive(Debug)]
pub struct CompetitionDriver {
    configuration: Configuration,
    inputs: Inputs,
}

impl CompetitionDriver {
    /// Creates a driver for one run.
    pub fn new(configuration: Configuration, inputs: Inputs) -> CompetitionDriver {
        CompetitionDriver {
            configuration,
            inputs,
        }
    }

    /// Performs the whole run: evaluate, persist, push.
    ///
    /// The store and artifacts are saved as soon as they change, so a push
    /// failure at the very end never discards results; it still fails the
    /// run so the CI surfaces it.
    #[instrument(skip(self), fields(participant = %self.inputs.participant_id))]
    pub fn run(&self) -> anyhow::Result<()> {
        if self.configuration.log {
            logger::init_logger();
        }
        let scenario = ScenarioConfig::load(".")?;
        let mut store = RankingStore::load(RANKING_FILE)?;
        let participant = Participant::fetch(
            &self.inputs.participant_id,
            &self.inputs.repository,
            &self.inputs.repo_token,
        )?
        .with_log_url(self.inputs.log_url.clone());

        let outcome = if let Some(opponent_id) = self.inputs.friendly_opponent.clone() {
            self.run_friendly(&scenario, &mut store, &participant, &opponent_id)
        } else if scenario.kind == ScenarioKind::Competition
            && scenario.world.metric == Metric::Ranking
        {
            self.run_ladder(&scenario, &mut store, &participant)
        } else {
            self.run_benchmark(&scenario, &mut store, &participant)
        };
        participant.remove_working_dir();
        storage::remove_match_leftovers(&[]);
        outcome?;

        if self.configuration.allow_push {
            let repository = self
                .inputs
                .push_repository
                .as_deref()
                .context("GITHUB_REPOSITORY is not set, cannot push the results")?;
            git::push_results(
                &self.inputs.pusher,
                &self.inputs.repo_token,
                repository,
                "record new performances",
            )?;
        }
        Ok(())
    }

    /// Climbs the ladder one opponent at a time until a loss or the top.
    fn run_ladder(
        &self,
        scenario: &ScenarioConfig,
        store: &mut RankingStore,
        participant: &Participant,
    ) -> anyhow::Result<()> {
        loop {
            if store.is_empty() {
                println!("The ranking is empty: {} takes first place.", participant.id);
                store.insert_first(participant)?;
                return store.save();
            }
            if store.position(&participant.id) == Some(0) {
                println!("{} holds first place.", participant.id);
                store.refresh_metadata(participant)?;
                return store.save();
            }

            // the entry right above a ranked participant, the current last
            // place for a new entrant
            let opponent_index = match store.position(&participant.id) {
                Some(position) => position - 1,
                None => store.len() - 1,
            };
            let opponent_entry = store.entry(opponent_index);
            let opponent_id = opponent_entry.id.clone();
            let opponent_repository = opponent_entry.repository.clone();

            let url = git::authenticated_url(&opponent_repository, &self.inputs.repo_token);
            if !git::remote_reachable(&url) {
                println!("Removing {opponent_id} from the ranking: repository is gone.");
                store.evict(&opponent_id)?;
                store.save()?;
                continue;
            }

            let token = &self.inputs.repo_token;
            let opponent =
                match Participant::fetch(&opponent_id, &opponent_repository, token) {
                    Ok(opponent) => opponent,
                    Err(e) => {
                        warn!("could not clone {opponent_id}, forfeit: {e:#}");
                        store.apply_ladder_result(
                            participant,
                            &opponent_id,
                            MatchResult::ParticipantWon,
                        )?;
                        store.save()?;
                        continue;
                    }
                };

            println!("Starting match: {} vs {}...", participant.id, opponent.id);
            let verdict = self.run_one_match(scenario, participant, Some(&opponent));
            opponent.remove_working_dir();
            let result = ladder_result(verdict?, scenario.world.timeout_policy())?;

            store.apply_ladder_result(participant, &opponent_id, result)?;
            store.save()?;
            let winner = match result {
                MatchResult::ParticipantWon => participant.id.as_str(),
                _ => opponent_id.as_str(),
            };
            if let Err(e) = storage::store_animation(winner) {
                warn!("no animation stored: {e:#}");
            }

            if result != MatchResult::ParticipantWon {
                println!("{} lost against {}.", participant.id, opponent_id);
                return Ok(());
            }
            println!("{} won against {}.", participant.id, opponent_id);
        }
    }

    /// One unranked match against a named opponent; annotation only.
    fn run_friendly(
        &self,
        scenario: &ScenarioConfig,
        store: &mut RankingStore,
        participant: &Participant,
        opponent_id: &str,
    ) -> anyhow::Result<()> {
        let position = store
            .position(opponent_id)
            .with_context(|| format!("friendly opponent {opponent_id} is not in the ranking"))?;
        let opponent_repository = store.entry(position).repository.clone();
        let opponent =
            Participant::fetch(opponent_id, &opponent_repository, &self.inputs.repo_token)?;

        println!(
            "Starting friendly game: {} vs {}...",
            participant.id, opponent.id
        );
        let verdict = self.run_one_match(scenario, participant, Some(&opponent));
        opponent.remove_working_dir();
        let result = ladder_result(verdict?, scenario.world.timeout_policy())?;
        let won = result == MatchResult::ParticipantWon;

        store.record_friendly_result(participant, opponent_id, won)?;
        store.save()?;
        let winner = if won { &participant.id } else { &opponent.id };
        if let Err(e) = storage::store_animation(winner) {
            warn!("no animation stored: {e:#}");
        }
        println!(
            "{} {} the friendly game against {}.",
            participant.id,
            if won { "won" } else { "lost" },
            opponent_id
        );
        Ok(())
    }

    /// One one-sided run scored by the reported performance value.
    fn run_benchmark(
        &self,
        scenario: &ScenarioConfig,
        store: &mut RankingStore,
        participant: &Participant,
    ) -> anyhow::Result<()> {
        println!("Starting evaluation of {}...", participant.id);
        let verdict = self.run_one_match(scenario, participant, None)?;
        let performance = match verdict {
            MatchVerdict::Scored(value) => value,
            MatchVerdict::TimedOut => match scenario.world.timeout_policy() {
                TimeoutPolicy::ScoreCeiling => scenario.world.max_duration,
                TimeoutPolicy::Fail => bail!(
                    "the run timed out after {} seconds",
                    scenario.world.max_duration
                ),
            },
            MatchVerdict::Failed(
                failure @ (MatchFailure::SimulatorExit(_) | MatchFailure::SimulatorHang),
            ) => bail!("{failure}"),
            MatchVerdict::Failed(failure) => {
                // recorded as the failure sentinel so the run still ranks
                println!("Evaluation failed: {failure}.");
                0.0
            }
            MatchVerdict::ForfeitWin => bail!("unexpected forfeit in a one-sided run"),
        };

        store.record_simple_score(participant, performance, scenario.world.higher_is_better)?;
        store.save()?;
        println!(
            "performance_line:{}",
            milestones::format_performance(performance, scenario.world.metric)
        );
        if let Err(e) = storage::store_animation(&participant.id) {
            warn!("no animation stored: {e:#}");
        }
        Ok(())
    }

    fn run_one_match(
        &self,
        scenario: &ScenarioConfig,
        participant: &Participant,
        opponent: Option<&Participant>,
    ) -> anyhow::Result<MatchVerdict> {
        let setup = MatchSetup {
            configuration: &self.configuration,
            world: &scenario.world,
            default_controller: &self.inputs.default_controller,
            participant,
            opponent,
        };
        let verdict = match_runner::run_match(&setup)?;
        info!(?verdict);
        Ok(verdict)
    }
}

/// Maps a two-sided verdict to a ladder result.
///
/// The simulator reports `1` for a participant win. Infrastructure failures
/// are errors; failures attributable to the participant's controller count
/// as [`MatchResult::ParticipantFailed`], which ranks like a loss.
fn ladder_result(verdict: MatchVerdict, policy: TimeoutPolicy) -> anyhow::Result<MatchResult> {
    Ok(match verdict {
        MatchVerdict::Scored(value) if value == 1.0 => MatchResult::ParticipantWon,
        MatchVerdict::Scored(_) => MatchResult::ParticipantLost,
        MatchVerdict::ForfeitWin => {
            println!("The opponent controller never joined: win by forfeit.");
            MatchResult::ParticipantWon
        }
        MatchVerdict::TimedOut => match policy {
            TimeoutPolicy::ScoreCeiling => MatchResult::ParticipantLost,
            TimeoutPolicy::Fail => bail!("the match timed out"),
        },
        MatchVerdict::Failed(
            failure @ (MatchFailure::SimulatorExit(_) | MatchFailure::SimulatorHang),
        ) => bail!("{failure}"),
        MatchVerdict::Failed(failure) => {
            println!("Your controller could not be evaluated: {failure}.");
            MatchResult::ParticipantFailed
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulator_win_value_is_a_win() {
        let result = ladder_result(MatchVerdict::Scored(1.0), TimeoutPolicy::Fail).unwrap();
        assert_eq!(result, MatchResult::ParticipantWon);
        let result = ladder_result(MatchVerdict::Scored(0.0), TimeoutPolicy::Fail).unwrap();
        assert_eq!(result, MatchResult::ParticipantLost);
    }

    #[test]
    fn ladder_timeout_follows_the_policy() {
        assert!(ladder_result(MatchVerdict::TimedOut, TimeoutPolicy::Fail).is_err());
        let result = ladder_result(MatchVerdict::TimedOut, TimeoutPolicy::ScoreCeiling).unwrap();
        assert_eq!(result, MatchResult::ParticipantLost);
    }

    #[test]
    fn controller_failure_ranks_like_a_loss() {
        let verdict = MatchVerdict::Failed(MatchFailure::ParticipantNeverConnected);
        let result = ladder_result(verdict, TimeoutPolicy::Fail).unwrap();
        assert_eq!(result, MatchResult::ParticipantFailed);
    }

    #[test]
    fn simulator_failure_is_fatal() {
        let verdict = MatchVerdict::Failed(MatchFailure::SimulatorExit(1));
        assert!(ladder_result(verdict, TimeoutPolicy::Fail).is_err());
        let verdict = MatchVerdict::Failed(MatchFailure::SimulatorHang);
        assert!(ladder_result(verdict, TimeoutPolicy::ScoreCeiling).is_err());
    }
}
