//! Database module
//!
//! This module provides database management functionality including:
//! - Database connection pool management
//! - Repository pattern implementations
//! - Database migrations
//! - Data models and schemas

pub mod manager;
pub mod migrations;
pub mod models;
pub mod repository;

pub use manager::DatabaseManager;
pub use models::{
    Achievement, Book, BookReview, BorrowedBook, Discussion, Notification, PowerUp,
    PrivateMessage, User, UserPowerUp, UserProfile,
};
pub use repository::{
    AchievementRepository, BookFilter, BookRepository, BorrowRepository, DiscussionRepository,
    FollowRepository, MessageRepository, NotificationRepository, PointsRepository,
    PowerUpRepository, ProfileRepository, Repository, ReviewRepository, UserRepository,
    UserReviewRepository,
};
