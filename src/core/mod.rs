//! Core business logic module
//!
//! This module provides the application layer including:
//! - Configuration management and structured logging
//! - Error handling and type system
//! - The lending workflow and social features
//! - The points economy: achievements, ranks, the store and leeches

pub mod achievements;
pub mod config;
pub mod error;
pub mod leech;
pub mod lending;
pub mod logging;
pub mod profiles;
pub mod ranks;
pub mod seed;
pub mod social;
pub mod store;
pub mod utils;

pub use achievements::{AchievementProgress, AchievementService, AwardedAchievement};
pub use config::Config;
pub use error::{ErrorResponse, LeafError, Result};
pub use leech::{LeechReport, LeechService};
pub use lending::{Approval, LendingService};
pub use logging::Logger;
pub use profiles::{ProfileService, ProfileUpdate};
pub use ranks::{rank_for, rank_info, Rank, RankInfo};
pub use social::SocialService;
pub use store::StoreService;
