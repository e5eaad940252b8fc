//! Rank ladder derived from cumulative points

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rank {
    pub name: &'static str,
    pub min_points: i64,
    pub color: &'static str,
    pub icon: &'static str,
}

/// Ordered by `min_points`, lowest first
pub const RANKS: [Rank; 8] = [
    Rank {
        name: "Newbie",
        min_points: 0,
        color: "#95a5a6",
        icon: "fa-seedling",
    },
    Rank {
        name: "Reader",
        min_points: 50,
        color: "#3498db",
        icon: "fa-book",
    },
    Rank {
        name: "Bookworm",
        min_points: 150,
        color: "#9b59b6",
        icon: "fa-book-open",
    },
    Rank {
        name: "Scholar",
        min_points: 300,
        color: "#e67e22",
        icon: "fa-graduation-cap",
    },
    Rank {
        name: "Expert",
        min_points: 500,
        color: "#f39c12",
        icon: "fa-star",
    },
    Rank {
        name: "Master",
        min_points: 750,
        color: "#e74c3c",
        icon: "fa-crown",
    },
    Rank {
        name: "Grandmaster",
        min_points: 1000,
        color: "#1abc9c",
        icon: "fa-gem",
    },
    Rank {
        name: "Legend",
        min_points: 1500,
        color: "#fd79a8",
        icon: "fa-trophy",
    },
];

/// Where a point total sits on the ladder
#[derive(Debug, Clone, Serialize)]
pub struct RankInfo {
    pub points: i64,
    pub current: Rank,
    pub next: Option<Rank>,
    pub points_to_next: Option<i64>,
    pub progress_percent: f64,
}

/// Highest rank whose threshold `points` reaches; negative totals are Newbie
pub fn rank_for(points: i64) -> Rank {
    RANKS
        .iter()
        .rev()
        .find(|rank| points >= rank.min_points)
        .copied()
        .unwrap_or(RANKS[0])
}

pub fn rank_info(points: i64) -> RankInfo {
    let current = rank_for(points);
    let next = RANKS.iter().find(|rank| rank.min_points > current.min_points).copied();

    let (points_to_next, progress_percent) = match next {
        Some(next) => {
            let span = (next.min_points - current.min_points) as f64;
            let done = (points.max(current.min_points) - current.min_points) as f64;
            let percent = (done / span * 100.0).clamp(0.0, 100.0);
            (Some(next.min_points - points), (percent * 10.0).round() / 10.0)
        }
        None => (None, 100.0),
    };

    RankInfo {
        points,
        current,
        next,
        points_to_next,
        progress_percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_thresholds() {
        assert_eq!(rank_for(-5).name, "Newbie");
        assert_eq!(rank_for(49).name, "Newbie");
        assert_eq!(rank_for(50).name, "Reader");
        assert_eq!(rank_for(150).name, "Bookworm");
        assert_eq!(rank_for(1499).name, "Grandmaster");
        assert_eq!(rank_for(10_000).name, "Legend");
    }

    #[test]
    fn test_rank_info_progress() {
        let info = rank_info(100);
        assert_eq!(info.current.name, "Reader");
        assert_eq!(info.next.map(|r| r.name), Some("Bookworm"));
        assert_eq!(info.points_to_next, Some(50));
        assert_eq!(info.progress_percent, 50.0);

        let top = rank_info(2000);
        assert!(top.next.is_none());
        assert_eq!(top.progress_percent, 100.0);
    }

    proptest! {
        #[test]
        fn prop_rank_is_monotonic(a in -100i64..5000, b in -100i64..5000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(rank_for(lo).min_points <= rank_for(hi).min_points);
        }

        #[test]
        fn prop_progress_is_bounded(points in -100i64..5000) {
            let info = rank_info(points);
            prop_assert!((0.0..=100.0).contains(&info.progress_percent));
            if let Some(to_next) = info.points_to_next {
                prop_assert!(to_next > 0);
            }
        }
    }
}
