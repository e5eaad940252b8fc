//! Built-in catalogs: achievements, power-ups and sample books

use crate::core::error::Result;
use crate::core::utils::now_timestamp;
use crate::db::manager::DatabaseManager;
use crate::db::models::{Achievement, AchievementCategory, AchievementRule, Book, PowerUp, PowerUpKind};
use crate::db::repository::{AchievementRepository, BookRepository, PowerUpRepository, Repository};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

struct AchievementSeed {
    name: &'static str,
    description: &'static str,
    category: AchievementCategory,
    rule: AchievementRule,
    requirement_value: i64,
    points: i64,
    icon: &'static str,
}

const ACHIEVEMENTS: &[AchievementSeed] = &[
    AchievementSeed {
        name: "First Book",
        description: "Post your first book to the library",
        category: AchievementCategory::Books,
        rule: AchievementRule::BooksPosted,
        requirement_value: 1,
        points: 10,
        icon: "fa-book",
    },
    AchievementSeed {
        name: "Book Collector",
        description: "Post 5 books to the library",
        category: AchievementCategory::Books,
        rule: AchievementRule::BooksPosted,
        requirement_value: 5,
        points: 50,
        icon: "fa-books",
    },
    AchievementSeed {
        name: "Librarian",
        description: "Post 10 books to the library",
        category: AchievementCategory::Books,
        rule: AchievementRule::BooksPosted,
        requirement_value: 10,
        points: 100,
        icon: "fa-book-open",
    },
    AchievementSeed {
        name: "First Review",
        description: "Write your first book review",
        category: AchievementCategory::Reviews,
        rule: AchievementRule::ReviewsWritten,
        requirement_value: 1,
        points: 5,
        icon: "fa-star",
    },
    AchievementSeed {
        name: "Critic",
        description: "Write 5 book reviews",
        category: AchievementCategory::Reviews,
        rule: AchievementRule::ReviewsWritten,
        requirement_value: 5,
        points: 25,
        icon: "fa-pen",
    },
    AchievementSeed {
        name: "Master Critic",
        description: "Write 15 book reviews",
        category: AchievementCategory::Reviews,
        rule: AchievementRule::ReviewsWritten,
        requirement_value: 15,
        points: 75,
        icon: "fa-feather",
    },
    AchievementSeed {
        name: "Social Butterfly",
        description: "Send 10 private messages",
        category: AchievementCategory::Social,
        rule: AchievementRule::MessagesSent,
        requirement_value: 10,
        points: 20,
        icon: "fa-comment",
    },
    AchievementSeed {
        name: "Community Helper",
        description: "Have 5 books borrowed by others",
        category: AchievementCategory::Social,
        rule: AchievementRule::BooksLent,
        requirement_value: 5,
        points: 30,
        icon: "fa-handshake",
    },
    AchievementSeed {
        name: "Early Adopter",
        description: "One of the first 100 users",
        category: AchievementCategory::Special,
        rule: AchievementRule::EarlyAdopter,
        requirement_value: 100,
        points: 15,
        icon: "fa-rocket",
    },
    AchievementSeed {
        name: "Dedication",
        description: "Active for 30 days",
        category: AchievementCategory::Time,
        rule: AchievementRule::DaysActive,
        requirement_value: 30,
        points: 40,
        icon: "fa-calendar-check",
    },
];

/// Insert the built-in achievements that are missing; returns how many were added
pub async fn seed_achievements(db: &Arc<DatabaseManager>) -> Result<usize> {
    let repo = AchievementRepository::new(db.clone());
    let now = now_timestamp();
    let mut added = 0;

    for seed in ACHIEVEMENTS {
        let achievement = Achievement {
            id: Uuid::new_v4().to_string(),
            name: seed.name.to_string(),
            description: seed.description.to_string(),
            category: seed.category,
            points: seed.points,
            rule: seed.rule,
            requirement_value: seed.requirement_value,
            icon: seed.icon.to_string(),
            color: "#ffd700".to_string(),
            is_active: true,
            created_at: now.clone(),
        };
        if repo.create(&achievement).await? {
            added += 1;
        }
    }

    info!(added, "Achievement catalog seeded");
    Ok(added)
}

/// Insert the built-in power-ups that are missing
pub async fn seed_power_ups(db: &Arc<DatabaseManager>) -> Result<usize> {
    let repo = PowerUpRepository::new(db.clone());
    let now = now_timestamp();
    let catalog = [
        PowerUp {
            id: Uuid::new_v4().to_string(),
            name: "Leech".to_string(),
            description: "Leech 5-6% of points from a random top 10 offline user every 5 minutes \
                          for 24 hours. Only works when the target is offline."
                .to_string(),
            cost: 600,
            kind: PowerUpKind::Leech,
            duration_hours: 24,
            effect_value: 0.055,
            icon: "fa-vampire-teeth".to_string(),
            color: "#8b0000".to_string(),
            is_active: true,
            created_at: now.clone(),
        },
        PowerUp {
            id: Uuid::new_v4().to_string(),
            name: "Double Points".to_string(),
            description: "Double your point earnings from all activities for 5 hours.".to_string(),
            cost: 200,
            kind: PowerUpKind::DoublePoints,
            duration_hours: 5,
            effect_value: 2.0,
            icon: "fa-gem".to_string(),
            color: "#ffd700".to_string(),
            is_active: true,
            created_at: now,
        },
    ];

    let mut added = 0;
    for power_up in &catalog {
        if repo.create(power_up).await? {
            added += 1;
        }
    }

    info!(added, "Power-up catalog seeded");
    Ok(added)
}

/// (title, author, category, isbn, description, year, pages)
const SAMPLE_BOOKS: &[(&str, &str, &str, &str, &str, i32, i32)] = &[
    (
        "To Kill a Mockingbird",
        "Harper Lee",
        "Fiction",
        "978-0-06-112008-4",
        "A gripping tale of racial injustice and childhood innocence in the American South.",
        1960,
        281,
    ),
    (
        "The Great Gatsby",
        "F. Scott Fitzgerald",
        "Fiction",
        "978-0-7432-7356-5",
        "A classic American novel about the Jazz Age and the American Dream.",
        1925,
        180,
    ),
    (
        "Pride and Prejudice",
        "Jane Austen",
        "Romance",
        "978-0-14-143951-8",
        "A romantic novel about manners, marriage, and morality in Georgian England.",
        1813,
        279,
    ),
    (
        "The Catcher in the Rye",
        "J.D. Salinger",
        "Fiction",
        "978-0-316-76948-0",
        "A controversial coming-of-age story about teenage rebellion and alienation.",
        1951,
        277,
    ),
    (
        "Sapiens",
        "Yuval Noah Harari",
        "Non-Fiction",
        "978-0-06-231609-7",
        "A brief history of humankind from the Stone Age to the present.",
        2014,
        443,
    ),
];

/// Add the sample books to an empty catalog; does nothing once any book exists
pub async fn seed_sample_books(db: &Arc<DatabaseManager>) -> Result<usize> {
    let repo = BookRepository::new(db.clone());
    if repo.count().await? > 0 {
        info!("Books already exist, skipping sample books");
        return Ok(0);
    }

    let now = now_timestamp();
    for (title, author, category, isbn, description, year, pages) in SAMPLE_BOOKS {
        let book = Book {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            author: author.to_string(),
            category: category.to_string(),
            isbn: isbn.to_string(),
            description: Some(description.to_string()),
            cover_url: None,
            publication_year: Some(*year),
            pages: Some(*pages),
            available: true,
            posted_by: None,
            created_at: now.clone(),
        };
        repo.create(&book).await?;
    }

    info!(count = SAMPLE_BOOKS.len(), "Sample books seeded");
    Ok(SAMPLE_BOOKS.len())
}
