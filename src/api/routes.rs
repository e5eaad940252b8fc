//! API routes

use crate::api::handlers::{
    activate_power_up, approve_borrow, cancel_borrow, check_achievements, create_book,
    dashboard, delete_book, delete_review, follow_user, get_achievement, get_book,
    get_conversation, get_profile, get_user, leaderboard, list_achievements, list_book_reviews,
    list_books, list_borrowed_books, list_categories, list_conversations, list_discussions,
    list_followers, list_following, list_notifications, list_ranks, list_user_achievements,
    list_user_reviews, list_users, mark_achievements_seen, mark_all_notifications_read,
    mark_notification_read, points_history, post_discussion, process_leeches,
    purchase_power_up, reject_borrow, request_borrow, respond_to_borrow_request, return_book,
    review_book, review_user, seed_achievements, seed_books, seed_power_ups, send_message,
    store_overview, unfollow_user, unread_notification_count, update_book, update_profile,
    update_review, AppState,
};
use crate::auth::handlers::{get_me, login, register, update_me};
use crate::auth::middleware::authenticate;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

/// Routes reachable without a token
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/login", post(login))
        .with_state(state)
}

/// Routes behind the bearer-token middleware
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // Accounts
        .route("/api/v1/me", get(get_me).put(update_me))
        .route("/api/v1/users", get(list_users))
        .route("/api/v1/users/:id", get(get_user))
        .route("/api/v1/users/:id/reviews", get(list_user_reviews).post(review_user))
        .route("/api/v1/users/:id/follow", post(follow_user).delete(unfollow_user))
        .route("/api/v1/users/:id/followers", get(list_followers))
        .route("/api/v1/users/:id/following", get(list_following))
        .route("/api/v1/users/:id/achievements", get(list_user_achievements))
        // Catalog
        .route("/api/v1/books", get(list_books).post(create_book))
        .route("/api/v1/books/categories", get(list_categories))
        .route(
            "/api/v1/books/:id",
            get(get_book).put(update_book).delete(delete_book),
        )
        // Lending
        .route("/api/v1/books/:id/borrow", post(request_borrow))
        .route("/api/v1/books/:id/borrow/approve", post(approve_borrow))
        .route("/api/v1/books/:id/borrow/reject", post(reject_borrow))
        .route("/api/v1/books/:id/borrow/cancel", post(cancel_borrow))
        .route("/api/v1/books/:id/return", post(return_book))
        .route("/api/v1/borrowed-books", get(list_borrowed_books))
        .route("/api/v1/dashboard", get(dashboard))
        // Reviews
        .route(
            "/api/v1/books/:id/reviews",
            get(list_book_reviews).post(review_book),
        )
        .route("/api/v1/reviews/:id", put(update_review).delete(delete_review))
        // Discussions and messages
        .route("/api/v1/discussions", get(list_discussions).post(post_discussion))
        .route("/api/v1/messages", get(list_conversations))
        .route(
            "/api/v1/messages/:user_id",
            get(get_conversation).post(send_message),
        )
        // Notifications
        .route("/api/v1/notifications", get(list_notifications))
        .route("/api/v1/notifications/count", get(unread_notification_count))
        .route("/api/v1/notifications/read-all", post(mark_all_notifications_read))
        .route("/api/v1/notifications/:id/read", put(mark_notification_read))
        .route(
            "/api/v1/notifications/:id/borrow-request/:action",
            post(respond_to_borrow_request),
        )
        // Achievements, ranks and points
        .route("/api/v1/achievements", get(list_achievements))
        .route("/api/v1/achievements/check", post(check_achievements))
        .route("/api/v1/achievements/seen", post(mark_achievements_seen))
        .route("/api/v1/achievements/:id", get(get_achievement))
        .route("/api/v1/ranks", get(list_ranks))
        .route("/api/v1/leaderboard", get(leaderboard))
        .route("/api/v1/points/history", get(points_history))
        // Profile customization and store
        .route("/api/v1/profile", get(get_profile).put(update_profile))
        .route("/api/v1/store", get(store_overview))
        .route("/api/v1/store/purchase", post(purchase_power_up))
        .route("/api/v1/store/activate", post(activate_power_up))
        // Administration
        .route("/api/v1/admin/seed/books", post(seed_books))
        .route("/api/v1/admin/seed/achievements", post(seed_achievements))
        .route("/api/v1/admin/seed/powerups", post(seed_power_ups))
        .route("/api/v1/admin/leeches/process", post(process_leeches))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}
