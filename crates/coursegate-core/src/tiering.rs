//! Recommendation tiers.
//!
//! Maps a score percentage to the message shown to the learner, the lockout
//! applied before the next attempt and whether the learner may advance.
//! This table is the only place lockout durations come from.

use serde::{Deserialize, Serialize};

/// Named score bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Critical,
    Low,
    Partial,
    NearPass,
    Pass,
    Excellent,
    OutOfRange,
}

/// Recommendation for a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub kind: TierKind,
    pub message: String,
    pub lockout_minutes: u32,
    pub can_advance: bool,
}

struct Bracket {
    upper: f64,
    kind: TierKind,
    lockout_minutes: u32,
    can_advance: bool,
    message: &'static str,
}

// Ordered by upper bound. A score belongs to the first bracket whose upper
// bound it does not exceed, except 61..70 which is open at the top.
const BRACKETS: [Bracket; 6] = [
    Bracket {
        upper: 10.0,
        kind: TierKind::Critical,
        lockout_minutes: 60,
        can_advance: false,
        message: "Go back over the whole module before trying again; the core ideas are not there yet.",
    },
    Bracket {
        upper: 30.0,
        kind: TierKind::Low,
        lockout_minutes: 45,
        can_advance: false,
        message: "Review the module content carefully and take notes before the next attempt.",
    },
    Bracket {
        upper: 60.0,
        kind: TierKind::Partial,
        lockout_minutes: 30,
        can_advance: false,
        message: "You have part of it. Revisit the sections you found hardest and try again.",
    },
    Bracket {
        upper: 70.0,
        kind: TierKind::NearPass,
        lockout_minutes: 15,
        can_advance: false,
        message: "Almost there. A short review of the weak spots should be enough.",
    },
    Bracket {
        upper: 85.0,
        kind: TierKind::Pass,
        lockout_minutes: 0,
        can_advance: true,
        message: "Good work. You can continue to the next module.",
    },
    Bracket {
        upper: 100.0,
        kind: TierKind::Excellent,
        lockout_minutes: 0,
        can_advance: true,
        message: "Excellent result. You have mastered this material.",
    },
];

/// Look up the tier for a score percentage.
///
/// Scores outside `[0, 100]` (or NaN) get a neutral tier with no lockout and
/// no advancement.
pub fn tier_for(percent: f64) -> Tier {
    if !(0.0..=100.0).contains(&percent) {
        return Tier {
            kind: TierKind::OutOfRange,
            message: "Score is outside the 0-100 range.".to_string(),
            lockout_minutes: 0,
            can_advance: false,
        };
    }

    let bracket = BRACKETS
        .iter()
        .find(|b| {
            if b.kind == TierKind::NearPass {
                percent < b.upper
            } else {
                percent <= b.upper
            }
        })
        .unwrap_or(&BRACKETS[BRACKETS.len() - 1]);

    Tier {
        kind: bracket.kind,
        message: bracket.message.to_string(),
        lockout_minutes: bracket.lockout_minutes,
        can_advance: bracket.can_advance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_boundaries() {
        let cases = [
            (0.0, 60, false),
            (10.0, 60, false),
            (11.0, 45, false),
            (30.0, 45, false),
            (31.0, 30, false),
            (60.0, 30, false),
            (61.0, 15, false),
            (69.0, 15, false),
            (70.0, 0, true),
            (85.0, 0, true),
            (86.0, 0, true),
            (100.0, 0, true),
        ];
        for (score, minutes, advance) in cases {
            let t = tier_for(score);
            assert_eq!(t.lockout_minutes, minutes, "score {score}");
            assert_eq!(t.can_advance, advance, "score {score}");
        }
    }

    #[test]
    fn pass_line_is_seventy() {
        assert!(tier_for(70.0).can_advance);
        assert!(!tier_for(69.0).can_advance);
        assert!(!tier_for(69.9).can_advance);
    }

    #[test]
    fn every_integer_maps_to_exactly_one_bracket() {
        let mut seen = std::collections::HashSet::new();
        let mut previous = None;
        for p in 0..=100 {
            let t = tier_for(p as f64);
            assert_ne!(t.kind, TierKind::OutOfRange);
            // Brackets are contiguous: once we leave a kind we never return to it.
            if previous != Some(t.kind) {
                assert!(seen.insert(t.kind), "kind {:?} repeated at {p}", t.kind);
                previous = Some(t.kind);
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn out_of_range_is_neutral() {
        for score in [-1.0, 100.5, f64::NAN, f64::INFINITY] {
            let t = tier_for(score);
            assert_eq!(t.kind, TierKind::OutOfRange);
            assert_eq!(t.lockout_minutes, 0);
            assert!(!t.can_advance);
        }
    }

    #[test]
    fn excellent_and_pass_have_distinct_messages() {
        assert_eq!(tier_for(90.0).kind, TierKind::Excellent);
        assert_eq!(tier_for(75.0).kind, TierKind::Pass);
        assert_ne!(tier_for(90.0).message, tier_for(75.0).message);
    }
}
