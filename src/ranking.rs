//! The persisted, rank-ordered participant list and its update rules.
//!
//! The store is a JSON document (`{"participants": [...]}`) whose array
//! order **is** the ranking, ascending. In ladder mode the `performance`
//! field mirrors the 1-based rank and is renumbered after every mutation, so
//! both representations always agree.
//!
//! The store is the single source of truth for standings. It is loaded once
//! at the start of a run, mutated in memory by the driver, and saved at every
//! checkpoint. Any inconsistency detected here (missing opponent, broken
//! rank sequence, duplicated id) is store corruption: a fatal error, never a
//! silent repair.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::participant::Participant;

/// Outcome of one ladder match, from the participant's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// The participant beat the opponent.
    ParticipantWon,
    /// The participant lost or drew.
    ParticipantLost,
    /// The participant's controller never produced a result.
    ParticipantFailed,
}

/// Annotation left on an entry by an unranked friendly game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendlyResult {
    /// Display name of the friendly opponent.
    pub opponent: String,
    /// Whether the entry's owner won that game.
    pub won: bool,
}

/// One persisted leaderboard line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankingEntry {
    /// Stable unique identifier.
    pub id: String,
    /// Source location in `owner/repo` form.
    pub repository: String,
    /// Whether the source repository is private.
    #[serde(default)]
    pub private: bool,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Two-letter country code or the `"demo"` sentinel.
    #[serde(default)]
    pub country: String,
    /// Controller implementation language.
    #[serde(default = "default_language")]
    pub language: String,
    /// Raw score in benchmark mode; the 1-based rank in ladder mode.
    pub performance: f64,
    /// UTC timestamp of the last update, `YYYY-MM-DDTHH:MM:SSZ`.
    #[serde(default)]
    pub date: String,
    /// Link to the last run's log, when one was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Result of the last friendly game, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friend: Option<FriendlyResult>,
}

impl RankingEntry {
    fn from_participant(participant: &Participant, performance: f64) -> RankingEntry {
        RankingEntry {
            id: participant.id.clone(),
            repository: participant.repository.clone(),
            private: false,
            name: participant.profile.name.clone(),
            description: participant.profile.description.clone(),
            country: participant.profile.country.clone(),
            language: participant.profile.language.clone(),
            performance,
            date: crate::utc_timestamp(),
            log: participant.log_url.clone(),
            friend: None,
        }
    }

    /// Refreshes everything but the performance/rank value.
    fn refresh_metadata(&mut self, participant: &Participant) {
        self.repository = participant.repository.clone();
        self.name = participant.profile.name.clone();
        self.description = participant.profile.description.clone();
        self.country = participant.profile.country.clone();
        self.language = participant.profile.language.clone();
        self.date = crate::utc_timestamp();
        if participant.log_url.is_some() {
            self.log = participant.log_url.clone();
        }
    }
}

fn default_language() -> String {
    crate::participant::DEFAULT_LANGUAGE.to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RankingDocument {
    participants: Vec<RankingEntry>,
}

/// The ordered participant list, bound to its JSON file.
#[derive(Debug)]
pub struct RankingStore {
    path: PathBuf,
    entries: Vec<RankingEntry>,
}

impl RankingStore {
    /// Loads the store from `path`; a missing file is an empty store.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<RankingStore> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Ok(RankingStore {
                path,
                entries: vec![],
            });
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let document: RankingDocument = serde_json::from_str(&text)
            .with_context(|| format!("corrupted ranking document {}", path.display()))?;
        Ok(RankingStore {
            path,
            entries: document.participants,
        })
    }

    /// Writes the store back to its file.
    ///
    /// Goes through a sibling temp file and a rename so a crash mid-write
    /// cannot leave a truncated document behind.
    pub fn save(&self) -> anyhow::Result<()> {
        let document = RankingDocument {
            participants: self.entries.clone(),
        };
        let text = serde_json::to_string(&document).context("cannot serialize ranking")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("cannot write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        Ok(())
    }

    /// Number of ranked participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is ranked yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 0-based position (= rank − 1) of `id`, if present.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    /// Entry at the given 0-based position.
    pub fn entry(&self, index: usize) -> &RankingEntry {
        &self.entries[index]
    }

    /// All entries in rank order.
    pub fn entries(&self) -> &[RankingEntry] {
        &self.entries
    }

    /// Inserts the very first participant at rank 1.
    ///
    /// # Errors
    ///
    /// Fails when the store is not empty.
    pub fn insert_first(&mut self, participant: &Participant) -> anyhow::Result<()> {
        if !self.entries.is_empty() {
            bail!("store already has {} participants", self.entries.len());
        }
        self.entries
            .push(RankingEntry::from_participant(participant, 1.0));
        self.check_unique_ids()
    }

    /// Refreshes a present participant's metadata without touching its rank.
    pub fn refresh_metadata(&mut self, participant: &Participant) -> anyhow::Result<()> {
        let position = self
            .position(&participant.id)
            .with_context(|| format!("{} is not in the ranking", participant.id))?;
        self.entries[position].refresh_metadata(participant);
        Ok(())
    }

    /// Records an independently scored run (benchmark / non-ranking metric).
    ///
    /// A present participant is removed first, then the new score is inserted
    /// at the first position it no longer beats, scanning from the top in the
    /// direction given by `higher_is_better`. Ties rank below the earlier
    /// holder.
    #[instrument(skip(self, participant))]
    pub fn record_simple_score(
        &mut self,
        participant: &Participant,
        performance: f64,
        higher_is_better: bool,
    ) -> anyhow::Result<()> {
        let previous = self
            .position(&participant.id)
            .map(|i| self.entries.remove(i));

        let mut entry = RankingEntry::from_participant(participant, performance);
        if let Some(previous) = previous {
            entry.private = previous.private;
            entry.friend = previous.friend;
        }

        let beats = |other: &RankingEntry| {
            if higher_is_better {
                performance > other.performance
            } else {
                performance < other.performance
            }
        };
        let position = self
            .entries
            .iter()
            .position(beats)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, entry);
        info!(
            "recorded performance {performance} for {} at position {}",
            participant.id,
            position + 1
        );
        self.check_unique_ids()
    }

    /// Applies a ladder duel outcome.
    ///
    /// - The opponent must already be ranked; anything else means the ladder
    ///   was corrupted between runs.
    /// - A loss (or failure) never moves a ranked participant; it only
    ///   refreshes metadata. An unranked loser is appended at the bottom.
    /// - A ranked winner swaps places with the opponent: exactly one
    ///   position climbed, nobody else moves.
    /// - An unranked winner may only have faced the current last-place
    ///   holder (which is how the driver hands out opponents for new
    ///   entrants); the winner takes that slot and the opponent drops to the
    ///   new last place. Any other pairing is rejected as a precondition
    ///   violation rather than guessed at.
    #[instrument(skip(self, participant))]
    pub fn apply_ladder_result(
        &mut self,
        participant: &Participant,
        opponent_id: &str,
        result: MatchResult,
    ) -> anyhow::Result<()> {
        let Some(opponent_position) = self.position(opponent_id) else {
            bail!(
                "opponent {opponent_id} is missing from {}: the ranking is corrupted",
                self.path.display()
            );
        };
        let participant_position = self.position(&participant.id);

        match (result, participant_position) {
            (MatchResult::ParticipantLost | MatchResult::ParticipantFailed, Some(position)) => {
                self.entries[position].refresh_metadata(participant);
            }
            (MatchResult::ParticipantLost | MatchResult::ParticipantFailed, None) => {
                let rank = self.entries.len() as f64 + 1.0;
                self.entries
                    .push(RankingEntry::from_participant(participant, rank));
            }
            (MatchResult::ParticipantWon, Some(position)) => {
                self.entries[position].refresh_metadata(participant);
                self.entries.swap(position, opponent_position);
            }
            (MatchResult::ParticipantWon, None) => {
                if opponent_position != self.entries.len() - 1 {
                    bail!(
                        "new entrant {} beat {} who is not ranked last: unsupported pairing",
                        participant.id,
                        opponent_id
                    );
                }
                let entry = RankingEntry::from_participant(participant, 0.0);
                self.entries.insert(opponent_position, entry);
            }
        }

        self.renumber();
        self.check_ladder_invariant()
    }

    /// Records an unranked friendly game: annotation only, no reordering.
    pub fn record_friendly_result(
        &mut self,
        participant: &Participant,
        opponent_name: &str,
        won: bool,
    ) -> anyhow::Result<()> {
        let position = self.position(&participant.id).with_context(|| {
            format!(
                "{} is not ranked: friendly games only annotate existing entries",
                participant.id
            )
        })?;
        let entry = &mut self.entries[position];
        entry.refresh_metadata(participant);
        entry.friend = Some(FriendlyResult {
            opponent: opponent_name.to_string(),
            won,
        });
        Ok(())
    }

    /// Removes an entry whose repository is gone; everyone below moves up.
    pub fn evict(&mut self, id: &str) -> anyhow::Result<()> {
        let position = self
            .position(id)
            .with_context(|| format!("cannot evict {id}: not in the ranking"))?;
        self.entries.remove(position);
        info!("evicted {id} from the ranking");
        self.renumber();
        self.check_ladder_invariant()
    }

    /// Rewrites `performance` to mirror the 1-based list position.
    fn renumber(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.performance = index as f64 + 1.0;
        }
    }

    /// Ranks must be the contiguous sequence `1..=N` with unique ids.
    fn check_ladder_invariant(&self) -> anyhow::Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            let expected = index as f64 + 1.0;
            if entry.performance != expected {
                bail!(
                    "ranking corrupted: {} holds rank {} at position {}",
                    entry.id,
                    entry.performance,
                    expected
                );
            }
        }
        self.check_unique_ids()
    }

    fn check_unique_ids(&self) -> anyhow::Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            if self.entries[..index].iter().any(|e| e.id == entry.id) {
                bail!("ranking corrupted: {} appears more than once", entry.id);
            }
        }
        Ok(())
    }
}
