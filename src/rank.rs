// Ranked tier/division ordering and salary derivation.
//
// One shared implementation: peak-rank tracking, audit, and roster
// transactions all compare ranks and derive salaries through this module.

use serde::{Deserialize, Serialize};

/// Queue identifier used by the league entry endpoint.
pub const RANKED_SOLO_QUEUE: &str = "RANKED_SOLO_5x5";
/// Numeric queue id for ranked solo in match data.
pub const RANKED_SOLO_QUEUE_ID: i64 = 420;

/// Ranked tier, ascending. The derived `Ord` is the league ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Emerald,
    Diamond,
    Master,
    Grandmaster,
    Challenger,
}

impl Tier {
    /// Parse the tier string the rank API returns ("GOLD", "IRON", ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IRON" => Some(Self::Iron),
            "BRONZE" => Some(Self::Bronze),
            "SILVER" => Some(Self::Silver),
            "GOLD" => Some(Self::Gold),
            "PLATINUM" => Some(Self::Platinum),
            "EMERALD" => Some(Self::Emerald),
            "DIAMOND" => Some(Self::Diamond),
            "MASTER" => Some(Self::Master),
            "GRANDMASTER" => Some(Self::Grandmaster),
            "CHALLENGER" => Some(Self::Challenger),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iron => "IRON",
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
            Self::Emerald => "EMERALD",
            Self::Diamond => "DIAMOND",
            Self::Master => "MASTER",
            Self::Grandmaster => "GRANDMASTER",
            Self::Challenger => "CHALLENGER",
        }
    }

    /// Base pay for the tier. Unknown tiers contribute 0 via `salary_for`.
    pub fn base_pay(&self) -> i64 {
        match self {
            Self::Iron => 10,
            Self::Bronze => 20,
            Self::Silver => 40,
            Self::Gold => 60,
            Self::Platinum => 80,
            Self::Emerald => 100,
            Self::Diamond => 130,
            Self::Master => 160,
            Self::Grandmaster => 180,
            Self::Challenger => 200,
        }
    }
}

/// Division within a tier, ascending (IV is the lowest).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Division {
    #[serde(rename = "IV")]
    Four,
    #[serde(rename = "III")]
    Three,
    #[serde(rename = "II")]
    Two,
    #[serde(rename = "I")]
    One,
}

impl Division {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IV" => Some(Self::Four),
            "III" => Some(Self::Three),
            "II" => Some(Self::Two),
            "I" => Some(Self::One),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Four => "IV",
            Self::Three => "III",
            Self::Two => "II",
            Self::One => "I",
        }
    }

    /// Bonus pay on top of the tier base.
    pub fn bonus_pay(&self) -> i64 {
        match self {
            Self::Four => 0,
            Self::Three => 10,
            Self::Two => 20,
            Self::One => 30,
        }
    }
}

/// A concrete rank. Derived `Ord` compares tier first, then division,
/// which is exactly the league ordering (GOLD I > GOLD II > SILVER I).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Rank {
    pub tier: Tier,
    pub division: Division,
}

impl Rank {
    pub fn new(tier: Tier, division: Division) -> Self {
        Self { tier, division }
    }

    /// Parse from the API string pair. `None` if either part is unknown.
    pub fn parse(tier: &str, division: &str) -> Option<Self> {
        Some(Self {
            tier: Tier::parse(tier)?,
            division: Division::parse(division)?,
        })
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tier.as_str(), self.division.as_str())
    }
}

/// Derive a salary from a rank: tier base plus division bonus.
pub fn calculate_salary(rank: Rank) -> i64 {
    rank.tier.base_pay() + rank.division.bonus_pay()
}

/// Salary for raw API strings. Unknown tier or division contributes 0
/// rather than erroring; a completely unknown pair is worth 0.
pub fn salary_for(tier: &str, division: &str) -> i64 {
    let base = Tier::parse(tier).map_or(0, |t| t.base_pay());
    let bonus = Division::parse(division).map_or(0, |d| d.bonus_pay());
    base + bonus
}

/// One rank entry as stored on a player record and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntry {
    pub queue_type: String,
    pub tier: String,
    pub division: String,
}

/// Highest solo-queue rank across a set of entries, or `None` if no
/// parseable solo-queue entry exists.
pub fn get_highest_rank(entries: &[RankEntry]) -> Option<Rank> {
    entries
        .iter()
        .filter(|e| e.queue_type == RANKED_SOLO_QUEUE)
        .filter_map(|e| Rank::parse(&e.tier, &e.division))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(queue: &str, tier: &str, division: &str) -> RankEntry {
        RankEntry {
            queue_type: queue.into(),
            tier: tier.into(),
            division: division.into(),
        }
    }

    #[test]
    fn test_tier_order_matches_ladder() {
        assert!(Tier::Iron < Tier::Bronze);
        assert!(Tier::Gold < Tier::Platinum);
        assert!(Tier::Grandmaster < Tier::Challenger);
    }

    #[test]
    fn test_division_order_iv_lowest() {
        assert!(Division::Four < Division::Three);
        assert!(Division::Three < Division::Two);
        assert!(Division::Two < Division::One);
    }

    #[test]
    fn test_rank_compare_tier_before_division() {
        let gold_four = Rank::parse("GOLD", "IV").unwrap();
        let gold_one = Rank::parse("GOLD", "I").unwrap();
        let silver_one = Rank::parse("SILVER", "I").unwrap();

        assert!(gold_one > gold_four);
        assert!(gold_four > silver_one);
        assert_eq!(gold_one, Rank::new(Tier::Gold, Division::One));
    }

    #[test]
    fn test_rank_order_is_total() {
        let ranks = [
            Rank::new(Tier::Iron, Division::Four),
            Rank::new(Tier::Gold, Division::Two),
            Rank::new(Tier::Gold, Division::Two),
            Rank::new(Tier::Challenger, Division::One),
        ];
        for a in &ranks {
            for b in &ranks {
                // Exactly one of <, ==, > holds.
                let relations = [a < b, a == b, a > b];
                assert_eq!(relations.iter().filter(|r| **r).count(), 1);
            }
        }
    }

    #[test]
    fn test_salary_monotonic_in_tier() {
        let tiers = [
            Tier::Iron,
            Tier::Bronze,
            Tier::Silver,
            Tier::Gold,
            Tier::Platinum,
            Tier::Emerald,
            Tier::Diamond,
            Tier::Master,
            Tier::Grandmaster,
            Tier::Challenger,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].base_pay() < pair[1].base_pay());
        }
    }

    #[test]
    fn test_salary_monotonic_in_division() {
        let divisions = [Division::Four, Division::Three, Division::Two, Division::One];
        for pair in divisions.windows(2) {
            let lower = calculate_salary(Rank::new(Tier::Gold, pair[0]));
            let higher = calculate_salary(Rank::new(Tier::Gold, pair[1]));
            assert!(lower < higher);
        }
    }

    #[test]
    fn test_salary_gold_two() {
        let rank = Rank::parse("GOLD", "II").unwrap();
        assert_eq!(calculate_salary(rank), 60 + 20);
    }

    #[test]
    fn test_salary_for_unknown_strings() {
        assert_eq!(salary_for("WOOD", "V"), 0);
        // Known tier with unknown division still pays the base.
        assert_eq!(salary_for("GOLD", "V"), 60);
        assert_eq!(salary_for("WOOD", "I"), 30);
    }

    #[test]
    fn test_highest_rank_filters_queue() {
        let entries = vec![
            entry("RANKED_FLEX_SR", "DIAMOND", "I"),
            entry(RANKED_SOLO_QUEUE, "GOLD", "II"),
            entry(RANKED_SOLO_QUEUE, "GOLD", "I"),
        ];
        assert_eq!(
            get_highest_rank(&entries),
            Some(Rank::new(Tier::Gold, Division::One))
        );
    }

    #[test]
    fn test_highest_rank_none_without_solo_entries() {
        let entries = vec![entry("RANKED_FLEX_SR", "GOLD", "I")];
        assert_eq!(get_highest_rank(&entries), None);

        let unparseable = vec![entry(RANKED_SOLO_QUEUE, "WOOD", "IX")];
        assert_eq!(get_highest_rank(&unparseable), None);
    }
}
