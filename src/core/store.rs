//! Power-up store: purchasing and activating power-ups with points

use crate::core::config::GamificationConfig;
use crate::core::error::{LeafError, Result};
use crate::core::leech::pick_target;
use crate::core::utils::{format_timestamp, parse_timestamp};
use crate::db::manager::DatabaseManager;
use crate::db::models::{PointKind, PowerUp, PowerUpKind, UserPoints, UserPowerUp};
use crate::db::repository::store::OwnedPowerUp;
use crate::db::repository::{points, store};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Lifecycle state of an owned power-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerUpStatus {
    Ready,
    Active,
    Expired,
}

impl PowerUpStatus {
    pub fn of(owned: &UserPowerUp, now: DateTime<Utc>) -> Self {
        if owned.is_running(now) {
            PowerUpStatus::Active
        } else if owned.is_consumed || owned.activated_at.is_some() {
            PowerUpStatus::Expired
        } else {
            PowerUpStatus::Ready
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InventoryItem {
    #[serde(flatten)]
    pub item: OwnedPowerUp,
    pub status: PowerUpStatus,
    pub remaining_secs: Option<i64>,
}

/// What the store page shows to one user
#[derive(Debug, Clone, Serialize)]
pub struct StoreOverview {
    pub power_ups: Vec<PowerUp>,
    pub points: i64,
    pub has_access: bool,
    pub min_points: i64,
    pub owned: Vec<InventoryItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub owned: UserPowerUp,
    pub power_up: PowerUp,
    pub remaining_points: i64,
    pub cancelled_leech: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    #[serde(flatten)]
    pub item: OwnedPowerUp,
    pub target: Option<UserPoints>,
    pub message: String,
}

pub struct StoreService {
    db: Arc<DatabaseManager>,
    config: GamificationConfig,
}

impl StoreService {
    pub fn new(db: Arc<DatabaseManager>, config: GamificationConfig) -> Self {
        Self { db, config }
    }

    pub fn has_access(&self, points: i64) -> bool {
        points >= self.config.store_min_points
    }

    pub async fn overview(&self, user_id: &str) -> Result<StoreOverview> {
        let user_id = user_id.to_string();
        let min_points = self.config.store_min_points;
        self.db
            .execute(move |conn| {
                let now = Utc::now();
                let points = points::total_points(conn, &user_id)?;
                let owned = store::query_owned_by_user(conn, &user_id)?
                    .into_iter()
                    .map(|item| {
                        let status = PowerUpStatus::of(&item.owned, now);
                        let remaining_secs = match status {
                            PowerUpStatus::Active => item
                                .owned
                                .expires_at
                                .as_deref()
                                .and_then(|ts| parse_timestamp(ts).ok())
                                .map(|expires| (expires - now).num_seconds().max(0)),
                            _ => None,
                        };
                        InventoryItem {
                            item,
                            status,
                            remaining_secs,
                        }
                    })
                    .collect();

                Ok(StoreOverview {
                    power_ups: store::active_catalog(conn)?,
                    points,
                    has_access: points >= min_points,
                    min_points,
                    owned,
                })
            })
            .await
    }

    /// Buy a power-up.
    ///
    /// Buying a leech replaces the running one. Other kinds may be owned once until the
    /// owned instance has run out.
    pub async fn purchase(&self, user_id: &str, power_up_id: &str) -> Result<PurchaseReceipt> {
        let uid = user_id.to_string();
        let power_up_id = power_up_id.to_string();
        let min_points = self.config.store_min_points;

        let receipt = self
            .db
            .transaction(move |tx| {
                let now = format_timestamp(Utc::now());
                let points = points::total_points(tx, &uid)?;
                if points < min_points {
                    return Err(LeafError::PermissionDenied(format!(
                        "The store unlocks at {} points",
                        min_points
                    )));
                }

                let power_up = store::find_power_up(tx, &power_up_id)?
                    .filter(|p| p.is_active)
                    .ok_or_else(|| LeafError::NotFound("Power-up not found or unavailable".to_string()))?;

                let mut cancelled_leech = false;
                if power_up.kind == PowerUpKind::Leech {
                    cancelled_leech = store::cancel_active_leeches(tx, &uid, &now)? > 0;
                } else if store::has_unexpired_of_kind(tx, &uid, power_up.kind, &now)? {
                    return Err(LeafError::Conflict(format!(
                        "You already own a {} power-up",
                        power_up.name
                    )));
                }

                if power_up.cost > points {
                    return Err(LeafError::InvalidRequest(format!(
                        "Not enough points! You need {} points but only have {}",
                        power_up.cost, points
                    )));
                }

                let owned = UserPowerUp {
                    id: Uuid::new_v4().to_string(),
                    user_id: uid.clone(),
                    power_up_id: power_up.id.clone(),
                    purchased_at: now.clone(),
                    activated_at: None,
                    expires_at: None,
                    is_active: false,
                    is_consumed: false,
                    target_user_id: None,
                    leeched_points: 0,
                };
                store::insert_user_power_up(tx, &owned)?;
                points::insert_transaction(
                    tx,
                    &uid,
                    -power_up.cost,
                    PointKind::Purchase,
                    &format!("Purchased {}", power_up.name),
                    Some(&owned.id),
                    &now,
                )?;

                Ok(PurchaseReceipt {
                    remaining_points: points - power_up.cost,
                    owned,
                    power_up,
                    cancelled_leech,
                })
            })
            .await?;

        info!(
            user_id = %user_id,
            power_up = %receipt.power_up.name,
            cost = receipt.power_up.cost,
            cancelled_leech = receipt.cancelled_leech,
            "Power-up purchased"
        );
        Ok(receipt)
    }

    /// Start an owned power-up; a leech also locks onto a target when one is available
    pub async fn activate(&self, user_id: &str, user_power_up_id: &str) -> Result<Activation> {
        let uid = user_id.to_string();
        let owned_id = user_power_up_id.to_string();
        let config = self.config.clone();

        let activation = self
            .db
            .transaction(move |tx| {
                let now = Utc::now();
                let mut item = store::find_owned(tx, &owned_id)?
                    .filter(|item| item.owned.user_id == uid)
                    .ok_or_else(|| LeafError::NotFound("Power-up not found".to_string()))?;

                match PowerUpStatus::of(&item.owned, now) {
                    PowerUpStatus::Active => {
                        return Err(LeafError::Conflict(
                            "This power-up is already active".to_string(),
                        ))
                    }
                    PowerUpStatus::Expired => {
                        return Err(LeafError::InvalidRequest(
                            "This power-up has already been used".to_string(),
                        ))
                    }
                    PowerUpStatus::Ready => {}
                }

                let target = match item.power_up.kind {
                    PowerUpKind::Leech => pick_target(tx, &uid, &config, now)?,
                    PowerUpKind::DoublePoints => None,
                };

                let activated_at = format_timestamp(now);
                let expires_at = format_timestamp(now + Duration::hours(item.power_up.duration_hours));
                let target_id = target.as_ref().map(|t| t.user_id.as_str());
                store::activate(tx, &item.owned.id, &activated_at, &expires_at, target_id)?;

                item.owned.is_active = true;
                item.owned.activated_at = Some(activated_at);
                item.owned.expires_at = Some(expires_at);
                item.owned.target_user_id = target_id.map(str::to_string);

                let message = match (item.power_up.kind, &target) {
                    (PowerUpKind::Leech, Some(t)) => format!(
                        "Leech activated! You are now leeching points from {} ({}) for the next {} hours.",
                        t.full_name, t.username, item.power_up.duration_hours
                    ),
                    (PowerUpKind::Leech, None) => {
                        "Leech activated, but no suitable offline target was found yet.".to_string()
                    }
                    (PowerUpKind::DoublePoints, _) => format!(
                        "Double Points activated! Your point earnings are doubled for {} hours.",
                        item.power_up.duration_hours
                    ),
                };

                Ok(Activation {
                    item,
                    target,
                    message,
                })
            })
            .await?;

        info!(
            user_id = %user_id,
            power_up = %activation.item.power_up.name,
            target_id = activation.target.as_ref().map(|t| t.user_id.as_str()).unwrap_or("-"),
            "Power-up activated"
        );
        Ok(activation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::seed;
    use crate::db::repository::test_support::{db, insert_user};
    use crate::db::repository::PowerUpRepository;

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

    async fn power_up_id(db: &Arc<DatabaseManager>, kind: PowerUpKind) -> String {
        PowerUpRepository::new(db.clone())
            .find_all_active()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.kind == kind)
            .unwrap()
            .id
    }

    async fn setup() -> (Arc<DatabaseManager>, StoreService) {
        let db = db();
        seed::seed_power_ups(&db).await.unwrap();
        insert_user(&db, "u1", "alice").await;
        let service = StoreService::new(db.clone(), Config::defaults().unwrap().gamification);
        (db, service)
    }

    #[tokio::test]
    async fn test_store_requires_min_points() {
        let (db, store) = setup().await;
        grant(&db, "u1", 149).await;
        let dp = power_up_id(&db, PowerUpKind::DoublePoints).await;

        assert!(!store.overview("u1").await.unwrap().has_access);
        assert!(matches!(
            store.purchase("u1", &dp).await,
            Err(LeafError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_purchase_deducts_and_blocks_duplicates() {
        let (db, store) = setup().await;
        grant(&db, "u1", 500).await;
        let dp = power_up_id(&db, PowerUpKind::DoublePoints).await;

        let receipt = store.purchase("u1", &dp).await.unwrap();
        assert_eq!(receipt.remaining_points, 300);
        assert_eq!(points_of(&db, "u1").await, 300);

        assert!(matches!(
            store.purchase("u1", &dp).await,
            Err(LeafError::Conflict(_))
        ));
        assert!(matches!(
            store.purchase("u1", "missing").await,
            Err(LeafError::NotFound(_))
        ));

        let leech = power_up_id(&db, PowerUpKind::Leech).await;
        assert!(matches!(
            store.purchase("u1", &leech).await,
            Err(LeafError::InvalidRequest(_))
        ));
        assert_eq!(points_of(&db, "u1").await, 300);
    }

    async fn points_of(db: &Arc<DatabaseManager>, user_id: &str) -> i64 {
        crate::db::repository::PointsRepository::new(db.clone())
            .total_for(user_id)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_activate_lifecycle() {
        let (db, store) = setup().await;
        insert_user(&db, "u2", "bob").await;
        grant(&db, "u1", 500).await;
        let dp = power_up_id(&db, PowerUpKind::DoublePoints).await;
        let receipt = store.purchase("u1", &dp).await.unwrap();

        assert!(matches!(
            store.activate("u2", &receipt.owned.id).await,
            Err(LeafError::NotFound(_))
        ));

        let activation = store.activate("u1", &receipt.owned.id).await.unwrap();
        assert!(activation.item.owned.is_active);
        assert!(activation.message.starts_with("Double Points activated!"));

        assert!(matches!(
            store.activate("u1", &receipt.owned.id).await,
            Err(LeafError::Conflict(_))
        ));

        let overview = store.overview("u1").await.unwrap();
        assert_eq!(overview.owned.len(), 1);
        assert_eq!(overview.owned[0].status, PowerUpStatus::Active);
        let remaining = overview.owned[0].remaining_secs.unwrap();
        assert!(remaining > 4 * 3600 && remaining <= 5 * 3600);

        // A running instance still blocks a second purchase
        assert!(matches!(
            store.purchase("u1", &dp).await,
            Err(LeafError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_new_leech_replaces_running_one() {
        let (db, store) = setup().await;
        insert_user(&db, "rich", "rich").await;
        grant(&db, "u1", 1500).await;
        grant(&db, "rich", 400).await;
        let leech = power_up_id(&db, PowerUpKind::Leech).await;

        let first = store.purchase("u1", &leech).await.unwrap();
        assert!(!first.cancelled_leech);
        let activation = store.activate("u1", &first.owned.id).await.unwrap();
        assert_eq!(
            activation.target.map(|t| t.user_id).as_deref(),
            Some("rich")
        );

        let second = store.purchase("u1", &leech).await.unwrap();
        assert!(second.cancelled_leech);
        assert_eq!(second.remaining_points, 300);

        assert!(matches!(
            store.activate("u1", &first.owned.id).await,
            Err(LeafError::InvalidRequest(_))
        ));
    }
}
