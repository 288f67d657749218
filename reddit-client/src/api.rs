use crate::rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
use brandwatch_core::{CoreError, Post, PostKind, RedditApiError, SearchQuery};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

/// Submission fields we read. Everything is optional on the wire so one
/// odd item cannot fail a whole listing; conversion decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditPostData {
    pub id: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub url: Option<String>,
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    pub score: Option<i64>,
    pub num_comments: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditCommentData {
    pub id: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub permalink: Option<String>,
    pub created_utc: Option<f64>,
    pub score: Option<i64>,
}

fn timestamp(created_utc: Option<f64>, item_id: &str) -> Result<DateTime<Utc>, CoreError> {
    let seconds = created_utc
        .filter(|s| s.is_finite())
        .ok_or_else(|| CoreError::malformed(item_id, "missing created_utc"))?;
    DateTime::from_timestamp(seconds as i64, 0)
        .ok_or_else(|| CoreError::malformed(item_id, "created_utc out of range"))
}

fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with("http") {
        permalink.to_string()
    } else {
        format!("{REDDIT_WEB_BASE}{permalink}")
    }
}

impl TryFrom<RedditPostData> for Post {
    type Error = CoreError;

    fn try_from(data: RedditPostData) -> Result<Self, Self::Error> {
        let id = data
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CoreError::malformed("<unknown>", "submission without id"))?;
        let created_at = timestamp(data.created_utc, &id)?;
        let permalink = data.permalink.unwrap_or_default();

        Ok(Post {
            title: data.title.unwrap_or_default(),
            content: data.selftext.unwrap_or_default(),
            author: data.author.unwrap_or_else(|| "[deleted]".to_string()),
            subreddit: data.subreddit.unwrap_or_default(),
            url: data.url.unwrap_or_else(|| absolute_permalink(&permalink)),
            permalink: absolute_permalink(&permalink),
            score: data.score.unwrap_or(0),
            num_comments: data.num_comments.unwrap_or(0),
            created_at,
            kind: PostKind::Post,
            id,
        })
    }
}

/// Comments inherit the submission title so matching sees the thread topic.
pub fn comment_to_post(data: RedditCommentData, submission: &Post) -> Result<Post, CoreError> {
    let id = data
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| CoreError::malformed("<unknown>", "comment without id"))?;
    let created_at = timestamp(data.created_utc, &id)?;
    let permalink = absolute_permalink(&data.permalink.unwrap_or_default());

    Ok(Post {
        title: submission.title.clone(),
        content: data.body.unwrap_or_default(),
        author: data.author.unwrap_or_else(|| "[deleted]".to_string()),
        subreddit: data
            .subreddit
            .unwrap_or_else(|| submission.subreddit.clone()),
        url: permalink.clone(),
        permalink,
        score: data.score.unwrap_or(0),
        num_comments: 0,
        created_at,
        kind: PostKind::Comment,
        id,
    })
}

/// Search string matching any keyword as a quoted phrase.
pub fn search_expression(keywords: &[String]) -> String {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(|k| format!("\"{}\"", k.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Collects `t1` comments depth-first through `replies` until `limit`.
fn collect_comments(children: &[Value], limit: usize, out: &mut Vec<RedditCommentData>) {
    for child in children {
        if out.len() >= limit {
            return;
        }
        if child.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(data) = child.get("data") else {
            continue;
        };

        match serde_json::from_value::<RedditCommentData>(data.clone()) {
            Ok(comment) => out.push(comment),
            Err(e) => warn!("Skipping unparseable comment: {}", e),
        }

        if let Some(replies) = data
            .get("replies")
            .and_then(|r| r.get("data"))
            .and_then(|d| d.get("children"))
            .and_then(Value::as_array)
        {
            collect_comments(replies, limit, out);
        }
    }
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(http_client: Client) -> Self {
        Self::with_base_url(http_client, REDDIT_API_BASE)
    }

    pub fn with_base_url(http_client: Client, base_url: &str) -> Self {
        Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::reddit_oauth())),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let _permit = self.rate_limiter.acquire_permit().await?;
        debug!("Acquired rate limit permit for {} {}", method, endpoint);

        let request = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params);

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(RedditApiError::RequestTimeout.into());
                }
                return Err(CoreError::source_unavailable("reddit", e.to_string()));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }.into()
            }
            StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken.into(),
            StatusCode::FORBIDDEN => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            }
            .into(),
            StatusCode::NOT_FOUND => RedditApiError::EndpointUnavailable {
                endpoint: endpoint.to_string(),
            }
            .into(),
            s if s.is_server_error() => {
                CoreError::source_unavailable("reddit", format!("server error {}", s.as_u16()))
            }
            s => RedditApiError::InvalidResponse {
                details: format!("unexpected status {} for {}", s.as_u16(), endpoint),
            }
            .into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<T, CoreError> {
        let response = self
            .make_request(Method::GET, endpoint, access_token, query_params)
            .await?;

        response.json().await.map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            RedditApiError::InvalidResponse {
                details: format!("unparseable body from {endpoint}"),
            }
            .into()
        })
    }

    /// One page of `/search`, newest first.
    pub async fn search(
        &self,
        access_token: &str,
        query: &SearchQuery,
    ) -> Result<RedditListing<RedditPostData>, CoreError> {
        let subreddits: Vec<&str> = query
            .subreddits
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        let searches_everything = subreddits.is_empty()
            || subreddits.iter().any(|s| s.eq_ignore_ascii_case("all"));

        let (endpoint, restrict) = if searches_everything {
            ("/search".to_string(), false)
        } else {
            (format!("/r/{}/search", subreddits.join("+")), true)
        };

        let mut params = vec![
            ("q", search_expression(&query.keywords)),
            ("sort", "new".to_string()),
            ("t", query.recency.as_str().to_string()),
            ("limit", query.limit.clamp(1, 100).to_string()),
            ("raw_json", "1".to_string()),
        ];
        if restrict {
            params.push(("restrict_sr", "1".to_string()));
        }

        let listing: RedditListing<RedditPostData> =
            self.get_json(&endpoint, access_token, &params).await?;

        info!(
            "Search on {} returned {} submissions",
            endpoint,
            listing.data.children.len()
        );
        Ok(listing)
    }

    /// Up to `limit` comments of a submission, depth-first.
    pub async fn comments(
        &self,
        access_token: &str,
        post_id: &str,
        limit: usize,
    ) -> Result<Vec<RedditCommentData>, CoreError> {
        let endpoint = format!("/comments/{post_id}");
        let params = [
            ("limit", limit.to_string()),
            ("sort", "new".to_string()),
            ("raw_json", "1".to_string()),
        ];

        let body: Value = self.get_json(&endpoint, access_token, &params).await?;

        // [submission listing, comment listing]
        let children = body
            .get(1)
            .and_then(|listing| listing.get("data"))
            .and_then(|data| data.get("children"))
            .and_then(Value::as_array)
            .ok_or_else(|| RedditApiError::InvalidResponse {
                details: format!("comment listing missing for {post_id}"),
            })?;

        let mut comments = Vec::new();
        collect_comments(children, limit, &mut comments);
        debug!("Fetched {} comments for {}", comments.len(), post_id);
        Ok(comments)
    }

    /// Submission by base36 id, `None` when Reddit does not know it.
    pub async fn submission(
        &self,
        access_token: &str,
        post_id: &str,
    ) -> Result<Option<RedditPostData>, CoreError> {
        let fullname = if post_id.starts_with("t3_") {
            post_id.to_string()
        } else {
            format!("t3_{post_id}")
        };
        let params = [("id", fullname), ("raw_json", "1".to_string())];

        let listing: RedditListing<RedditPostData> =
            self.get_json("/api/info", access_token, &params).await?;

        Ok(listing
            .data
            .children
            .into_iter()
            .find(|child| child.kind == "t3")
            .map(|child| child.data))
    }

    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.rate_limiter.status().await
    }
}
