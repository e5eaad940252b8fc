use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct DiscussionQuery {
    pub book_id: Option<String>,
}

/// Body of a discussion post or a private message
#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
    pub book_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}
