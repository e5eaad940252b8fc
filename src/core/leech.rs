//! Leech power-up processing
//!
//! A running leech periodically credits its owner with a share of an offline top
//! user's points. The target keeps their points. Each pass switches off expired
//! power-ups first, then ticks every running leech.

use crate::core::config::GamificationConfig;
use crate::core::error::Result;
use crate::core::utils::{format_timestamp, is_recent};
use crate::db::manager::DatabaseManager;
use crate::db::models::{PointKind, UserPoints};
use crate::db::repository::{points, store, users};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of one processing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LeechReport {
    /// Leeches that transferred points
    pub processed: usize,
    /// Leeches skipped because the target was online or missing
    pub paused: usize,
    /// Power-ups switched off because they ran out
    pub expired: usize,
    pub points_awarded: i64,
}

/// Choose a leech target at random among the top users by points.
///
/// Candidates exclude the owner, hold at least `leech_min_target_points` and are offline.
pub fn pick_target(
    conn: &Connection,
    owner_id: &str,
    config: &GamificationConfig,
    now: DateTime<Utc>,
) -> Result<Option<UserPoints>> {
    let candidates: Vec<UserPoints> = points::top_users(conn, config.leech_candidate_pool + 1)?
        .into_iter()
        .filter(|u| u.user_id != owner_id)
        .take(config.leech_candidate_pool)
        .filter(|u| u.total_points >= config.leech_min_target_points)
        .filter(|u| !is_recent(u.last_activity.as_deref(), now, config.online_window_secs))
        .collect();

    Ok(candidates.choose(&mut rand::thread_rng()).cloned())
}

/// Points taken in one tick: a random share of the target's total, at least 1
pub fn leech_amount(target_points: i64, min_percent: f64, max_percent: f64) -> i64 {
    let share = if max_percent > min_percent {
        rand::thread_rng().gen_range(min_percent..=max_percent)
    } else {
        min_percent
    };
    ((target_points as f64 * share).floor() as i64).max(1)
}

/// Runs leech ticks, on demand or from the background scheduler
pub struct LeechService {
    db: Arc<DatabaseManager>,
    config: GamificationConfig,
}

impl LeechService {
    pub fn new(db: Arc<DatabaseManager>, config: GamificationConfig) -> Self {
        Self { db, config }
    }

    /// Expire stale power-ups and tick every running leech, all in one transaction
    pub async fn process_active_leeches(&self) -> Result<LeechReport> {
        let config = self.config.clone();
        let report = self
            .db
            .transaction(move |tx| process_pass(tx, &config, Utc::now()))
            .await?;

        if report.processed > 0 || report.expired > 0 {
            info!(
                processed = report.processed,
                paused = report.paused,
                expired = report.expired,
                points = report.points_awarded,
                "Leech pass finished"
            );
        }
        Ok(report)
    }

    /// Spawn the periodic pass
    pub fn start_scheduler(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = Duration::from_secs(self.config.leech_interval_secs);
        info!(interval_secs = period.as_secs(), "Starting leech scheduler");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                match self.process_active_leeches().await {
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => {
                        warn!("Leech pass failed, retrying next tick: {}", e);
                    }
                    Err(e) => error!("Failed to process leeches: {}", e),
                }
            }
        })
    }
}

fn process_pass(conn: &Connection, config: &GamificationConfig, now: DateTime<Utc>) -> Result<LeechReport> {
    let now_str = format_timestamp(now);
    let mut report = LeechReport {
        expired: store::expire_stale(conn, &now_str)?,
        ..Default::default()
    };

    for leech in store::running_leeches(conn, &now_str)? {
        let owned = &leech.owned;

        let target_id = match owned.target_user_id.clone() {
            Some(id) => id,
            None => match pick_target(conn, &owned.user_id, config, now)? {
                Some(target) => {
                    store::set_target(conn, &owned.id, &target.user_id)?;
                    target.user_id
                }
                None => {
                    debug!(power_up_id = %owned.id, "No leech target available");
                    report.paused += 1;
                    continue;
                }
            },
        };

        let Some(target) = users::find_user(conn, &target_id)? else {
            report.paused += 1;
            continue;
        };
        if target.is_online(now, config.online_window_secs) {
            info!(
                power_up_id = %owned.id,
                target_id = %target.id,
                "Leech paused, target is online"
            );
            report.paused += 1;
            continue;
        }

        let target_points = points::total_points(conn, &target.id)?.max(0);
        let amount = leech_amount(target_points, config.leech_min_percent, config.leech_max_percent);
        points::insert_transaction(
            conn,
            &owned.user_id,
            amount,
            PointKind::Leech,
            &format!("Points leeched from {} ({} pts)", target.username, amount),
            Some(&owned.id),
            &now_str,
        )?;
        store::add_leeched_points(conn, &owned.id, amount)?;

        report.processed += 1;
        report.points_awarded += amount;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::seed;
    use crate::db::models::UserPowerUp;
    use crate::db::repository::test_support::{db, insert_user};
    use crate::db::repository::PointsRepository;
    use chrono::Duration as ChronoDuration;

    fn config() -> GamificationConfig {
        let mut config = Config::defaults().unwrap().gamification;
        config.leech_min_percent = 0.05;
        config.leech_max_percent = 0.05;
        config
    }

    async fn grant(db: &Arc<DatabaseManager>, user_id: &str, amount: i64) {
        let user_id = user_id.to_string();
        db.execute(move |conn| {
            points::insert_transaction(
                conn,
                &user_id,
                amount,
                PointKind::Achievement,
                "grant",
                None,
                &format_timestamp(Utc::now()),
            )
            .map(|_| ())
        })
        .await
        .unwrap();
    }

    async fn set_activity(db: &Arc<DatabaseManager>, user_id: &str, at: DateTime<Utc>) {
        let user_id = user_id.to_string();
        db.execute(move |conn| {
            conn.execute(
                "UPDATE users SET last_activity = ? WHERE id = ?",
                [format_timestamp(at), user_id],
            )?;
            Ok(())
        })
        .await
        .unwrap();
    }

    /// Give `owner` a running leech; returns the owned power-up id
    async fn running_leech(db: &Arc<DatabaseManager>, owner: &str, expires_in: ChronoDuration) -> String {
        seed::seed_power_ups(db).await.unwrap();
        let owner = owner.to_string();
        db.execute(move |conn| {
            let leech_id: String = conn.query_row(
                "SELECT id FROM power_ups WHERE kind = 'leech'",
                [],
                |row| row.get(0),
            )?;
            let now = Utc::now();
            let id = format!("leech-{}", owner);
            store::insert_user_power_up(
                conn,
                &UserPowerUp {
                    id: id.clone(),
                    user_id: owner,
                    power_up_id: leech_id,
                    purchased_at: format_timestamp(now),
                    activated_at: None,
                    expires_at: None,
                    is_active: false,
                    is_consumed: false,
                    target_user_id: None,
                    leeched_points: 0,
                },
            )?;
            store::activate(
                conn,
                &id,
                &format_timestamp(now),
                &format_timestamp(now + expires_in),
                None,
            )?;
            Ok(id)
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_leech_amount_floor_and_minimum() {
        assert_eq!(leech_amount(1000, 0.05, 0.05), 50);
        assert_eq!(leech_amount(1010, 0.055, 0.055), 55);
        assert_eq!(leech_amount(3, 0.05, 0.05), 1);

        for _ in 0..50 {
            let amount = leech_amount(1000, 0.05, 0.06);
            assert!((50..=60).contains(&amount));
        }
    }

    #[tokio::test]
    async fn test_pick_target_filters_candidates() {
        let db = db();
        let config = config();
        insert_user(&db, "me", "me").await;
        insert_user(&db, "rich", "rich").await;
        insert_user(&db, "online", "online").await;
        insert_user(&db, "poor", "poor").await;
        grant(&db, "me", 5000).await;
        grant(&db, "rich", 400).await;
        grant(&db, "online", 800).await;
        grant(&db, "poor", 20).await;
        set_activity(&db, "online", Utc::now()).await;

        for _ in 0..10 {
            let config = config.clone();
            let target = db
                .execute(move |conn| pick_target(conn, "me", &config, Utc::now()))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(target.user_id, "rich");
        }
    }

    #[tokio::test]
    async fn test_pass_transfers_points_without_deducting() {
        let db = db();
        insert_user(&db, "owner", "owner").await;
        insert_user(&db, "target", "target").await;
        grant(&db, "target", 1000).await;
        let leech_id = running_leech(&db, "owner", ChronoDuration::hours(24)).await;

        let service = LeechService::new(db.clone(), config());
        let report = service.process_active_leeches().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.points_awarded, 50);

        let ledger = PointsRepository::new(db.clone());
        assert_eq!(ledger.total_for("owner").await.unwrap(), 50);
        assert_eq!(ledger.total_for("target").await.unwrap(), 1000);

        let owned = crate::db::repository::PowerUpRepository::new(db.clone())
            .find_owned(&leech_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owned.owned.target_user_id.as_deref(), Some("target"));
        assert_eq!(owned.owned.leeched_points, 50);

        let (history, _) = ledger
            .history("owner", crate::core::utils::PageRequest::new(None, None, 20))
            .await
            .unwrap();
        assert_eq!(history[0].description, "Points leeched from target (50 pts)");
    }

    #[tokio::test]
    async fn test_broke_target_still_yields_minimum() {
        let db = db();
        insert_user(&db, "owner", "owner").await;
        insert_user(&db, "target", "target").await;
        let leech_id = running_leech(&db, "owner", ChronoDuration::hours(24)).await;
        db.execute(move |conn| store::set_target(conn, &leech_id, "target"))
            .await
            .unwrap();

        let report = LeechService::new(db.clone(), config())
            .process_active_leeches()
            .await
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.paused, 0);
        assert_eq!(report.points_awarded, 1);
        assert_eq!(
            PointsRepository::new(db.clone()).total_for("owner").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_online_target_pauses_tick() {
        let db = db();
        insert_user(&db, "owner", "owner").await;
        insert_user(&db, "target", "target").await;
        grant(&db, "target", 1000).await;
        running_leech(&db, "owner", ChronoDuration::hours(24)).await;

        let service = LeechService::new(db.clone(), config());
        service.process_active_leeches().await.unwrap();

        set_activity(&db, "target", Utc::now()).await;
        let report = service.process_active_leeches().await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.paused, 1);
        assert_eq!(
            PointsRepository::new(db.clone()).total_for("owner").await.unwrap(),
            50
        );
    }

    #[tokio::test]
    async fn test_expired_leech_is_switched_off() {
        let db = db();
        insert_user(&db, "owner", "owner").await;
        insert_user(&db, "target", "target").await;
        grant(&db, "target", 1000).await;
        running_leech(&db, "owner", ChronoDuration::seconds(-1)).await;

        let report = LeechService::new(db.clone(), config())
            .process_active_leeches()
            .await
            .unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(
            PointsRepository::new(db.clone()).total_for("owner").await.unwrap(),
            0
        );
    }
}
