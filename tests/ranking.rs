use std::path::PathBuf;

use competition_runner::participant::{Participant, Profile};
use competition_runner::ranking::{MatchResult, RankingStore};

fn participant(id: &str) -> Participant {
    Participant {
        id: id.to_string(),
        repository: format!("cyberbotics/{id}"),
        controller_dir: PathBuf::from("controllers").join(id),
        profile: Profile {
            name: id.to_uppercase(),
            description: String::new(),
            country: "CH".to_string(),
            language: "python".to_string(),
        },
        log_url: None,
    }
}

/// Ranks must always read 1, 2, 3... in array order.
fn assert_contiguous_ranks(store: &RankingStore) {
    for (index, entry) in store.entries().iter().enumerate() {
        assert_eq!(
            entry.performance,
            index as f64 + 1.0,
            "rank of {} does not match its position",
            entry.id
        );
    }
}

/// Builds a ladder of `ids` in order, rank 1 first.
fn ladder(path: &std::path::Path, ids: &[&str]) -> RankingStore {
    let mut store = RankingStore::load(path).unwrap();
    store.insert_first(&participant(ids[0])).unwrap();
    for pair in ids.windows(2) {
        // each newcomer loses to the last-place holder and is appended
        store
            .apply_ladder_result(&participant(pair[1]), pair[0], MatchResult::ParticipantLost)
            .unwrap();
    }
    assert_contiguous_ranks(&store);
    store
}

#[test]
fn first_participant_takes_rank_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("participants.json");
    let mut store = RankingStore::load(&path).unwrap();
    assert!(store.is_empty());

    store.insert_first(&participant("alice")).unwrap();
    store.save().unwrap();

    let reloaded = RankingStore::load(&path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.entry(0).id, "alice");
    assert_eq!(reloaded.entry(0).performance, 1.0);
}

#[test]
fn a_win_swaps_exactly_one_pair() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob", "carol", "dave"]);

    store
        .apply_ladder_result(&participant("carol"), "bob", MatchResult::ParticipantWon)
        .unwrap();

    let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["alice", "carol", "bob", "dave"]);
    assert_contiguous_ranks(&store);
}

#[test]
fn new_entrant_beating_last_takes_the_old_last_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob"]);

    store
        .apply_ladder_result(&participant("carol"), "bob", MatchResult::ParticipantWon)
        .unwrap();

    let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["alice", "carol", "bob"]);
    assert_contiguous_ranks(&store);
}

#[test]
fn new_entrant_beating_a_middle_rank_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob", "carol"]);

    let error = store
        .apply_ladder_result(&participant("mallory"), "bob", MatchResult::ParticipantWon)
        .unwrap_err();
    assert!(error.to_string().contains("mallory"));
}

#[test]
fn a_missing_opponent_means_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice"]);

    let error = store
        .apply_ladder_result(&participant("bob"), "ghost", MatchResult::ParticipantWon)
        .unwrap_err();
    assert!(error.to_string().contains("corrupted"));
}

#[test]
fn losing_refreshes_metadata_but_never_moves_anyone() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob", "carol"]);

    let mut bob = participant("bob");
    bob.profile.description = "new description".to_string();
    bob.log_url = Some("https://ci.example.com/run/7".to_string());

    for _ in 0..2 {
        store
            .apply_ladder_result(&bob, "alice", MatchResult::ParticipantLost)
            .unwrap();
        let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["alice", "bob", "carol"]);
        assert_contiguous_ranks(&store);
    }
    assert_eq!(store.entry(1).description, "new description");
    assert_eq!(store.entry(1).log.as_deref(), Some("https://ci.example.com/run/7"));
}

#[test]
fn a_failed_controller_ranks_like_a_loss() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice"]);

    store
        .apply_ladder_result(&participant("bob"), "alice", MatchResult::ParticipantFailed)
        .unwrap();

    assert_eq!(store.entry(1).id, "bob");
    assert_contiguous_ranks(&store);
}

#[test]
fn eviction_shifts_everyone_below_up() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob", "carol"]);

    store.evict("bob").unwrap();

    let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["alice", "carol"]);
    assert_contiguous_ranks(&store);
}

#[test]
fn friendly_result_is_annotation_only() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob"]);

    store
        .record_friendly_result(&participant("bob"), "alice", true)
        .unwrap();

    let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["alice", "bob"]);
    let friend = store.entry(1).friend.as_ref().unwrap();
    assert_eq!(friend.opponent, "alice");
    assert!(friend.won);
}

#[test]
fn simple_scores_order_by_the_configured_direction() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");

    let mut store = RankingStore::load(&store_path).unwrap();
    store
        .record_simple_score(&participant("alice"), 10.0, true)
        .unwrap();
    store
        .record_simple_score(&participant("bob"), 20.0, true)
        .unwrap();
    store
        .record_simple_score(&participant("carol"), 15.0, true)
        .unwrap();
    let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["bob", "carol", "alice"]);

    // a rerun replaces the previous entry instead of duplicating it
    store
        .record_simple_score(&participant("alice"), 25.0, true)
        .unwrap();
    let ids: Vec<_> = store.entries().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["alice", "bob", "carol"]);

    let mut lower = RankingStore::load(dir.path().join("times.json")).unwrap();
    lower
        .record_simple_score(&participant("alice"), 42.0, false)
        .unwrap();
    lower
        .record_simple_score(&participant("bob"), 17.0, false)
        .unwrap();
    assert_eq!(lower.entry(0).id, "bob");
}

#[test]
fn saved_documents_reload_identically() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("participants.json");
    let mut store = ladder(&store_path, &["alice", "bob"]);
    store
        .record_friendly_result(&participant("alice"), "bob", false)
        .unwrap();
    store.save().unwrap();

    let reloaded = RankingStore::load(&store_path).unwrap();
    assert_eq!(reloaded.entries(), store.entries());
}
