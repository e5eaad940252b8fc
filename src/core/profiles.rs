//! Paid profile customization

use crate::core::config::GamificationConfig;
use crate::core::error::{LeafError, Result};
use crate::core::utils::format_timestamp;
use crate::db::manager::DatabaseManager;
use crate::db::models::{PointKind, UserProfile};
use crate::db::repository::{points, profiles};
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const MAX_TITLE_CHARS: usize = 30;
const MAX_STYLE_CHARS: usize = 50;

lazy_static! {
    static ref HEX_COLOR: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
}

/// Requested changes; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub banner_style: Option<String>,
    pub custom_title: Option<String>,
    pub title_color: Option<String>,
    pub background_style: Option<String>,
    pub background_overlay: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileReceipt {
    pub profile: UserProfile,
    pub spent: i64,
    pub remaining_points: i64,
}

fn style(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > MAX_STYLE_CHARS {
        return Err(LeafError::ValidationError(format!(
            "{} must be between 1 and {} characters",
            field, MAX_STYLE_CHARS
        )));
    }
    Ok(value.to_string())
}

/// Apply `update` to `current` and price the paid fields that actually changed
pub fn apply_update(
    current: &UserProfile,
    update: &ProfileUpdate,
    config: &GamificationConfig,
) -> Result<(UserProfile, i64)> {
    let mut next = current.clone();
    let mut cost = 0;

    if let Some(banner) = &update.banner_style {
        let banner = style(banner, "banner_style")?;
        if banner != current.banner_style {
            cost += config.banner_cost;
            next.banner_style = banner;
        }
    }

    if let Some(title) = &update.custom_title {
        let title = title.trim();
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(LeafError::ValidationError(format!(
                "Custom title cannot exceed {} characters",
                MAX_TITLE_CHARS
            )));
        }
        let title = (!title.is_empty()).then(|| title.to_string());
        if title != current.custom_title {
            // Clearing a title is free
            if title.is_some() {
                cost += config.title_cost;
            }
            next.custom_title = title;
        }
    }

    if let Some(color) = &update.title_color {
        let color = color.trim();
        if !HEX_COLOR.is_match(color) {
            return Err(LeafError::ValidationError(
                "Title color must look like #rrggbb".to_string(),
            ));
        }
        let color = color.to_lowercase();
        if color != current.title_color.to_lowercase() {
            cost += config.title_color_cost;
            next.title_color = color;
        }
    }

    if let Some(background) = &update.background_style {
        let background = style(background, "background_style")?;
        if background != current.background_style {
            cost += config.background_cost;
            next.background_style = background;
        }
    }

    if let Some(overlay) = update.background_overlay {
        next.background_overlay = overlay;
    }

    Ok((next, cost))
}

pub struct ProfileService {
    db: Arc<DatabaseManager>,
    config: GamificationConfig,
}

impl ProfileService {
    pub fn new(db: Arc<DatabaseManager>, config: GamificationConfig) -> Self {
        Self { db, config }
    }

    pub async fn update(&self, user_id: &str, update: ProfileUpdate) -> Result<ProfileReceipt> {
        let uid = user_id.to_string();
        let config = self.config.clone();

        let receipt = self
            .db
            .transaction(move |tx| {
                let now = format_timestamp(Utc::now());
                let current = profiles::find_profile(tx, &uid)?
                    .unwrap_or_else(|| UserProfile::default_for(&uid, &now));
                let (mut next, cost) = apply_update(&current, &update, &config)?;

                let balance = points::total_points(tx, &uid)?;
                if cost > balance {
                    return Err(LeafError::InvalidRequest(format!(
                        "Not enough points! You need {} points but only have {}",
                        cost, balance
                    )));
                }

                next.updated_at = now.clone();
                profiles::upsert_profile(tx, &next)?;
                if cost > 0 {
                    points::insert_transaction(
                        tx,
                        &uid,
                        -cost,
                        PointKind::Profile,
                        "Profile customization",
                        None,
                        &now,
                    )?;
                }

                Ok(ProfileReceipt {
                    profile: next,
                    spent: cost,
                    remaining_points: balance - cost,
                })
            })
            .await?;

        info!(user_id = %user_id, spent = receipt.spent, "Profile updated");
        Ok(receipt)
    }
}
