use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body for `accounts/{a}/locations/{l}/localPosts`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPostRequest {
    pub language_code: String,
    pub summary: String,
    pub topic_type: String,
}

impl LocalPostRequest {
    /// A plain "what's new" post.
    pub fn standard(summary: impl Into<String>) -> Self {
        Self {
            language_code: "en".to_string(),
            summary: summary.into(),
            topic_type: "STANDARD".to_string(),
        }
    }
}

/// A created local post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPost {
    /// Resource name: `accounts/{a}/locations/{l}/localPosts/{id}`
    pub name: String,
    pub summary: Option<String>,
    pub state: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub search_url: Option<String>,
}

/// Reviewer attribution on a review.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reviewer {
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// The owner's reply attached to a review.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReply {
    pub comment: String,
    pub update_time: Option<DateTime<Utc>>,
}

/// A customer review.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub review_id: String,
    #[serde(default)]
    pub reviewer: Reviewer,
    /// `ONE` .. `FIVE`, or `STAR_RATING_UNSPECIFIED`
    pub star_rating: Option<String>,
    pub comment: Option<String>,
    pub create_time: Option<DateTime<Utc>>,
    pub review_reply: Option<ReviewReply>,
}

impl Review {
    /// Star rating as a number, 0 when unspecified.
    pub fn stars(&self) -> u8 {
        match self.star_rating.as_deref() {
            Some("ONE") => 1,
            Some("TWO") => 2,
            Some("THREE") => 3,
            Some("FOUR") => 4,
            Some("FIVE") => 5,
            _ => 0,
        }
    }
}

/// Page of reviews.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReviewsResponse {
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub next_page_token: Option<String>,
    pub total_review_count: Option<i64>,
}

/// Body for `reviews/{id}/reply`.
#[derive(Debug, Clone, Serialize)]
pub struct ReplyRequest {
    pub comment: String,
}

/// A Business Profile account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Resource name: `accounts/{id}`
    pub name: String,
    pub account_name: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
}

impl Account {
    /// Bare account id without the `accounts/` prefix.
    pub fn id(&self) -> &str {
        self.name.strip_prefix("accounts/").unwrap_or(&self.name)
    }
}

/// Page of accounts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAccountsResponse {
    #[serde(default)]
    pub accounts: Vec<Account>,
    pub next_page_token: Option<String>,
}

/// Response from the OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<i64>,
    /// Only present when Google rotates the refresh token.
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// A successfully refreshed access token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in_secs: i64,
    pub refresh_token: Option<String>,
}
