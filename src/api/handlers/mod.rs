pub mod admin;
pub mod books;
pub mod gamification;
pub mod lending;
pub mod reviews;
pub mod social;
pub mod users;

pub use admin::*;
pub use books::*;
pub use gamification::*;
pub use lending::*;
pub use reviews::*;
pub use social::*;
pub use users::*;

use crate::core::config::Config;
use crate::core::{
    AchievementService, LeechService, LendingService, ProfileService, SocialService, StoreService,
};
use crate::db::manager::DatabaseManager;
use crate::db::repository::{
    AchievementRepository, BookRepository, BorrowRepository, DiscussionRepository,
    FollowRepository, MessageRepository, NotificationRepository, PointsRepository,
    PowerUpRepository, ProfileRepository, ReviewRepository, UserRepository, UserReviewRepository,
};
use std::sync::Arc;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseManager>,
    pub jwt_secret: Arc<String>,

    pub user_repo: Arc<UserRepository>,
    pub book_repo: Arc<BookRepository>,
    pub borrow_repo: Arc<BorrowRepository>,
    pub review_repo: Arc<ReviewRepository>,
    pub user_review_repo: Arc<UserReviewRepository>,
    pub discussion_repo: Arc<DiscussionRepository>,
    pub message_repo: Arc<MessageRepository>,
    pub notification_repo: Arc<NotificationRepository>,
    pub follow_repo: Arc<FollowRepository>,
    pub achievement_repo: Arc<AchievementRepository>,
    pub points_repo: Arc<PointsRepository>,
    pub profile_repo: Arc<ProfileRepository>,
    pub power_up_repo: Arc<PowerUpRepository>,

    pub lending: Arc<LendingService>,
    pub achievements: Arc<AchievementService>,
    pub social: Arc<SocialService>,
    pub store: Arc<StoreService>,
    pub profiles: Arc<ProfileService>,
    pub leeches: Arc<LeechService>,
}

impl AppState {
    pub fn new(config: Arc<Config>, db: Arc<DatabaseManager>) -> Self {
        let gamification = config.gamification.clone();
        Self {
            jwt_secret: Arc::new(config.security.jwt_secret.clone()),

            user_repo: Arc::new(UserRepository::new(db.clone())),
            book_repo: Arc::new(BookRepository::new(db.clone())),
            borrow_repo: Arc::new(BorrowRepository::new(db.clone())),
            review_repo: Arc::new(ReviewRepository::new(db.clone())),
            user_review_repo: Arc::new(UserReviewRepository::new(db.clone())),
            discussion_repo: Arc::new(DiscussionRepository::new(db.clone())),
            message_repo: Arc::new(MessageRepository::new(db.clone())),
            notification_repo: Arc::new(NotificationRepository::new(db.clone())),
            follow_repo: Arc::new(FollowRepository::new(db.clone())),
            achievement_repo: Arc::new(AchievementRepository::new(db.clone())),
            points_repo: Arc::new(PointsRepository::new(db.clone())),
            profile_repo: Arc::new(ProfileRepository::new(db.clone())),
            power_up_repo: Arc::new(PowerUpRepository::new(db.clone())),

            lending: Arc::new(LendingService::new(db.clone(), config.lending.clone())),
            achievements: Arc::new(AchievementService::new(db.clone())),
            social: Arc::new(SocialService::new(db.clone())),
            store: Arc::new(StoreService::new(db.clone(), gamification.clone())),
            profiles: Arc::new(ProfileService::new(db.clone(), gamification.clone())),
            leeches: Arc::new(LeechService::new(db.clone(), gamification)),

            db,
            config,
        }
    }
}
