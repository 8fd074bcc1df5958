// Split eligibility tracking.
//
// Qualifying ranked-solo games are bucketed into named split windows.
// Counting is incremental: every inspected match id is remembered on the
// player record, so re-processing the same history never double-charges a
// match and never re-fetches its detail. The eligibility flag is sticky
// once earned.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::db::{Database, DbError, PlayerRecord};
use crate::rank::RANKED_SOLO_QUEUE_ID;
use crate::riot::{RiotClient, RiotError};

#[derive(Debug, thiserror::Error)]
pub enum EligibilityError {
    #[error(transparent)]
    Riot(#[from] RiotError),
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A named half-season window. `end = None` means the window is still open
/// and closes at "now". Both bounds are inclusive.
#[derive(Debug, Clone)]
pub struct Split {
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Split {
    pub fn new(name: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end.unwrap_or_else(Utc::now)
    }
}

/// The season's tracked splits: summer closes mid-August, fall stays open
/// until the season rollover.
pub fn default_splits(year: i32) -> Vec<Split> {
    let date = |m: u32, d: u32| {
        Utc.with_ymd_and_hms(year, m, d, 0, 0, 0)
            .single()
            .expect("valid split boundary")
    };
    vec![
        Split::new("summer", date(6, 1), Some(date(8, 15))),
        Split::new("fall", date(8, 16), None),
    ]
}

/// The match fields counting needs.
#[derive(Debug, Clone)]
pub struct MatchSample {
    pub match_id: String,
    pub queue_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of one counting pass over a set of matches.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EligibilityDelta {
    /// Additional qualifying games per split name.
    pub split_counts: BTreeMap<String, i64>,
    /// Ids inspected in this pass (qualifying or not); union these into the
    /// player's high-water mark.
    pub inspected: BTreeSet<String>,
}

impl EligibilityDelta {
    /// Total qualifying games added across all splits.
    pub fn total(&self) -> i64 {
        self.split_counts.values().sum()
    }
}

/// Bucket `samples` into `splits`, skipping ids in `already_counted`.
///
/// Each split is checked independently, so a match inside two overlapping
/// windows counts once per window it satisfies. Non-solo-queue matches
/// qualify for nothing but are still marked inspected.
pub fn count_eligible_matches(
    samples: &[MatchSample],
    splits: &[Split],
    already_counted: &BTreeSet<String>,
) -> EligibilityDelta {
    let mut delta = EligibilityDelta::default();
    for sample in samples {
        if already_counted.contains(&sample.match_id)
            || delta.inspected.contains(&sample.match_id)
        {
            continue;
        }
        delta.inspected.insert(sample.match_id.clone());
        if sample.queue_id != RANKED_SOLO_QUEUE_ID {
            continue;
        }
        for split in splits {
            if split.contains(sample.created_at) {
                *delta.split_counts.entry(split.name.clone()).or_insert(0) += 1;
            }
        }
    }
    delta
}

/// Outcome of one eligibility refresh for a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityOutcome {
    /// Already eligible; no work was done.
    pub skipped: bool,
    /// Crossed the threshold during this refresh.
    pub newly_eligible: bool,
    /// Cumulative qualifying games across tracked splits.
    pub total_count: i64,
    /// New matches inspected during this refresh.
    pub new_matches: usize,
}

/// Pulls match history, buckets it into splits, and persists progress.
pub struct EligibilityTracker {
    db: Arc<Database>,
    riot: RiotClient,
    splits: Vec<Split>,
    required_game_count: i64,
}

impl EligibilityTracker {
    pub fn new(
        db: Arc<Database>,
        riot: RiotClient,
        splits: Vec<Split>,
        required_game_count: i64,
    ) -> Self {
        Self {
            db,
            riot,
            splits,
            required_game_count,
        }
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    /// Refresh one player's eligibility counters.
    ///
    /// Already-eligible players are skipped outright (the flag is sticky,
    /// so there is nothing left to learn). Only match ids beyond the
    /// stored high-water mark are fetched in detail.
    pub async fn refresh_player(
        &self,
        player: &PlayerRecord,
    ) -> Result<EligibilityOutcome, EligibilityError> {
        if player.eligible_for_split {
            return Ok(EligibilityOutcome {
                skipped: true,
                newly_eligible: false,
                total_count: player.eligible_match_count,
                new_matches: 0,
            });
        }

        let puuid = match self.resolve_player_puuid(player).await? {
            Some(puuid) => puuid,
            None => {
                tracing::warn!(
                    discord_id = %player.discord_id,
                    "no resolvable riot identity, skipping eligibility refresh"
                );
                return Ok(EligibilityOutcome {
                    skipped: true,
                    newly_eligible: false,
                    total_count: player.eligible_match_count,
                    new_matches: 0,
                });
            }
        };

        let earliest_start = self.splits.iter().map(|s| s.start.timestamp()).min();
        let match_ids = self
            .riot
            .list_match_ids(&puuid, earliest_start, None, Some(RANKED_SOLO_QUEUE_ID))
            .await?;

        let mut samples = Vec::new();
        for match_id in match_ids {
            if player.counted_match_ids.contains(&match_id) {
                continue;
            }
            match self.riot.get_match_detail(&match_id).await? {
                Some(detail) => {
                    let created_at = Utc
                        .timestamp_millis_opt(detail.game_creation_ms)
                        .single()
                        .unwrap_or_else(Utc::now);
                    samples.push(MatchSample {
                        match_id,
                        queue_id: detail.queue_id,
                        created_at,
                    });
                }
                None => {
                    tracing::warn!(match_id = %match_id, "match detail not found, skipping");
                }
            }
        }

        let delta = count_eligible_matches(&samples, &self.splits, &player.counted_match_ids);
        let new_matches = delta.inspected.len();

        let mut split_counts = player.split_game_counts.clone();
        for (split, added) in &delta.split_counts {
            *split_counts.entry(split.clone()).or_insert(0) += added;
        }
        let total_count: i64 = split_counts.values().sum();
        let mut counted = player.counted_match_ids.clone();
        counted.extend(delta.inspected);

        let newly_eligible = total_count >= self.required_game_count;
        self.db
            .apply_eligibility_progress(
                &player.discord_id,
                &split_counts,
                &counted,
                total_count,
                newly_eligible,
            )
            .await?;

        if newly_eligible {
            tracing::info!(
                discord_id = %player.discord_id,
                total_count,
                "player crossed the eligibility threshold"
            );
        }

        Ok(EligibilityOutcome {
            skipped: false,
            newly_eligible,
            total_count,
            new_matches,
        })
    }

    /// Stored puuid, or resolve and cache it from the riot id.
    async fn resolve_player_puuid(
        &self,
        player: &PlayerRecord,
    ) -> Result<Option<String>, EligibilityError> {
        if let Some(puuid) = &player.puuid {
            return Ok(Some(puuid.clone()));
        }
        let (Some(game_name), Some(tag_line)) = (&player.game_name, &player.tag_line) else {
            return Ok(None);
        };
        match self.riot.resolve_puuid(game_name, tag_line).await? {
            Some(puuid) => {
                self.db.set_puuid(&player.discord_id, &puuid).await?;
                Ok(Some(puuid))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> DateTime<Utc> {
        format!("{s}T00:00:00Z").parse().unwrap()
    }

    fn sample(id: &str, queue: i64, created: &str) -> MatchSample {
        MatchSample {
            match_id: id.to_string(),
            queue_id: queue,
            created_at: date(created),
        }
    }

    fn summer_split() -> Split {
        Split::new("summer", date("2026-06-01"), Some(date("2026-08-15")))
    }

    fn fall_split() -> Split {
        Split::new("fall", date("2026-08-16"), None)
    }

    #[test]
    fn test_counts_solo_queue_in_window() {
        let splits = vec![summer_split(), fall_split()];
        let samples = vec![
            sample("m1", RANKED_SOLO_QUEUE_ID, "2026-06-10"),
            sample("m2", RANKED_SOLO_QUEUE_ID, "2026-08-20"),
            // Wrong queue: inspected but never counted.
            sample("m3", 440, "2026-06-10"),
            // Before every window.
            sample("m4", RANKED_SOLO_QUEUE_ID, "2026-01-01"),
        ];
        let delta = count_eligible_matches(&samples, &splits, &BTreeSet::new());
        assert_eq!(delta.split_counts.get("summer"), Some(&1));
        assert_eq!(delta.split_counts.get("fall"), Some(&1));
        assert_eq!(delta.total(), 2);
        assert_eq!(delta.inspected.len(), 4);
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let splits = vec![summer_split()];
        let samples = vec![
            sample("start", RANKED_SOLO_QUEUE_ID, "2026-06-01"),
            sample("end", RANKED_SOLO_QUEUE_ID, "2026-08-15"),
        ];
        let delta = count_eligible_matches(&samples, &splits, &BTreeSet::new());
        assert_eq!(delta.split_counts.get("summer"), Some(&2));
    }

    #[test]
    fn test_overlapping_windows_count_independently() {
        let splits = vec![
            Split::new("a", date("2026-06-01"), Some(date("2026-07-01"))),
            Split::new("b", date("2026-06-15"), Some(date("2026-07-15"))),
        ];
        let samples = vec![sample("m1", RANKED_SOLO_QUEUE_ID, "2026-06-20")];
        let delta = count_eligible_matches(&samples, &splits, &BTreeSet::new());
        assert_eq!(delta.split_counts.get("a"), Some(&1));
        assert_eq!(delta.split_counts.get("b"), Some(&1));
    }

    #[test]
    fn test_recount_is_idempotent() {
        let splits = vec![summer_split()];
        let samples: Vec<MatchSample> = (0..10)
            .map(|i| sample(&format!("m{i}"), RANKED_SOLO_QUEUE_ID, "2026-06-10"))
            .collect();

        let first = count_eligible_matches(&samples, &splits, &BTreeSet::new());
        assert_eq!(first.total(), 10);

        // Second pass over the same ids contributes nothing.
        let second = count_eligible_matches(&samples, &splits, &first.inspected);
        assert_eq!(second.total(), 0);
        assert!(second.inspected.is_empty());
    }

    #[test]
    fn test_duplicate_ids_within_one_pass() {
        let splits = vec![summer_split()];
        let samples = vec![
            sample("m1", RANKED_SOLO_QUEUE_ID, "2026-06-10"),
            sample("m1", RANKED_SOLO_QUEUE_ID, "2026-06-10"),
        ];
        let delta = count_eligible_matches(&samples, &splits, &BTreeSet::new());
        assert_eq!(delta.total(), 1);
    }

    #[test]
    fn test_open_ended_split_reaches_now() {
        let splits = vec![fall_split()];
        let recent = Utc::now() - chrono::Duration::hours(1);
        let samples = vec![MatchSample {
            match_id: "m1".into(),
            queue_id: RANKED_SOLO_QUEUE_ID,
            created_at: recent,
        }];
        let delta = count_eligible_matches(&samples, &splits, &BTreeSet::new());
        assert_eq!(delta.split_counts.get("fall"), Some(&1));
    }

    #[tokio::test]
    async fn test_refresh_skips_already_eligible() {
        let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
        db.upsert_player("1", "a").await.unwrap();
        db.set_eligible("1", true).await.unwrap();
        let player = db.get_player("1").await.unwrap().unwrap();

        // Client points nowhere; a skipped refresh must not touch the API.
        let riot = RiotClient::with_base_urls(
            String::new(),
            crate::rate_limit::PacingLimiter::per_second(1),
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
        );
        let tracker = EligibilityTracker::new(db, riot, vec![summer_split()], 30);
        let outcome = tracker.refresh_player(&player).await.unwrap();
        assert!(outcome.skipped);
        assert!(!outcome.newly_eligible);
    }
}
