//! Pure Google Business Profile REST API client.
//!
//! A minimal client for the parts of the Business Profile APIs an automation
//! backend needs: creating local posts, listing and replying to reviews,
//! listing accounts, and exchanging a refresh token for a new access token.
//! Every call takes the tenant's access token, so one client serves all
//! tenants.
//!
//! # Example
//!
//! ```rust,ignore
//! use gbp_client::{GbpClient, OAuthClient};
//!
//! let oauth = OAuthClient::new(client_id, client_secret);
//! let token = oauth.refresh(&refresh_token).await?;
//!
//! let client = GbpClient::new();
//! let reviews = client.list_reviews(&token.access_token, "123", "456").await?;
//! ```

pub mod error;
pub mod types;

pub use error::{GbpError, Result};
pub use types::{
    Account, ListAccountsResponse, ListReviewsResponse, LocalPost, LocalPostRequest,
    RefreshedToken, ReplyRequest, Review, ReviewReply, Reviewer, TokenResponse,
};

use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;

const BUSINESS_API_URL: &str = "https://mybusiness.googleapis.com/v4";
const ACCOUNTS_API_URL: &str = "https://mybusinessaccountmanagement.googleapis.com/v1";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GbpError::Api {
            status: status.as_u16(),
            message: body,
        });
    }

    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| GbpError::Parse(format!("{e}: {body}")))
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Business Profile API client.
#[derive(Debug, Clone)]
pub struct GbpClient {
    client: reqwest::Client,
    business_url: String,
    accounts_url: String,
}

impl Default for GbpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GbpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: http_client(timeout),
            business_url: BUSINESS_API_URL.to_string(),
            accounts_url: ACCOUNTS_API_URL.to_string(),
        }
    }

    /// Point both API families at another host (test servers, proxies).
    pub fn with_base_urls(
        mut self,
        business_url: impl Into<String>,
        accounts_url: impl Into<String>,
    ) -> Self {
        self.business_url = business_url.into();
        self.accounts_url = accounts_url.into();
        self
    }

    fn location_path(&self, account_id: &str, location_id: &str) -> String {
        format!(
            "{}/accounts/{}/locations/{}",
            self.business_url, account_id, location_id
        )
    }

    /// Create a standard local post. Returns the created post.
    pub async fn create_local_post(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        summary: &str,
    ) -> Result<LocalPost> {
        if account_id.is_empty() {
            return Err(GbpError::Config("account id is required".into()));
        }

        let url = format!("{}/localPosts", self.location_path(account_id, location_id));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&LocalPostRequest::standard(summary))
            .send()
            .await?;

        let post: LocalPost = read_json(resp).await?;
        tracing::debug!(location_id, post = %post.name, "Local post created");
        Ok(post)
    }

    /// Fetch one page of reviews for a location.
    pub async fn list_reviews_page(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        page_token: Option<&str>,
    ) -> Result<ListReviewsResponse> {
        let url = format!("{}/reviews", self.location_path(account_id, location_id));
        let mut req = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("pageSize", "50"), ("orderBy", "updateTime desc")]);
        if let Some(token) = page_token {
            req = req.query(&[("pageToken", token)]);
        }

        read_json(req.send().await?).await
    }

    /// Fetch the most recent page of reviews for a location.
    pub async fn list_reviews(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
    ) -> Result<Vec<Review>> {
        let page = self
            .list_reviews_page(access_token, account_id, location_id, None)
            .await?;
        Ok(page.reviews)
    }

    /// Create or replace the owner's reply to a review.
    pub async fn reply_to_review(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        review_id: &str,
        comment: &str,
    ) -> Result<ReviewReply> {
        let url = format!(
            "{}/reviews/{}/reply",
            self.location_path(account_id, location_id),
            review_id
        );
        let resp = self
            .client
            .put(&url)
            .bearer_auth(access_token)
            .json(&ReplyRequest {
                comment: comment.to_string(),
            })
            .send()
            .await?;

        read_json(resp).await
    }

    /// List the accounts the token's user can manage.
    pub async fn list_accounts(&self, access_token: &str) -> Result<Vec<Account>> {
        let url = format!("{}/accounts", self.accounts_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let page: ListAccountsResponse = read_json(resp).await?;
        Ok(page.accounts)
    }
}

/// Google OAuth token endpoint client (refresh-token grant).
#[derive(Clone)]
pub struct OAuthClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_url: String,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: http_client(DEFAULT_TIMEOUT),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        if refresh_token.is_empty() {
            return Err(GbpError::Config("refresh token is empty".into()));
        }

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let resp = self.client.post(&self.token_url).form(&params).send().await?;
        let token: TokenResponse = read_json(resp).await?;

        if let Some(error) = token.error {
            let desc = token.error_description.unwrap_or_default();
            return Err(GbpError::Api {
                status: 400,
                message: format!("{error}: {desc}"),
            });
        }

        let access_token = token
            .access_token
            .ok_or_else(|| GbpError::Parse("no access_token in token response".into()))?;

        Ok(RefreshedToken {
            access_token,
            expires_in_secs: token.expires_in.unwrap_or(3600),
            refresh_token: token.refresh_token,
        })
    }
}
