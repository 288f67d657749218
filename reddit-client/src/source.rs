use async_stream::try_stream;
use async_trait::async_trait;
use brandwatch_core::{
    matched_keywords, ConfigError, CoreError, ErrorExt, Post, PostSource, PostStream,
    RedditApiError, RedditConfig, SearchQuery,
};
use futures::stream;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{comment_to_post, RedditApiClient, REDDIT_API_BASE};
use crate::auth::{TokenManager, REDDIT_TOKEN_URL};

/// Matching comments yielded per submission.
pub const MAX_MATCHING_COMMENTS: usize = 50;

/// Comments fetched per submission before keyword filtering.
const COMMENT_FETCH_LIMIT: usize = 500;

/// `PostSource` backed by the Reddit REST API.
///
/// Each matching submission is followed by its matching comments, which
/// carry the submission title.
pub struct RedditSource {
    api: RedditApiClient,
    auth: TokenManager,
    max_comments: usize,
}

impl RedditSource {
    pub fn new(config: &RedditConfig) -> Result<Self, CoreError> {
        Self::with_endpoints(config, REDDIT_API_BASE, REDDIT_TOKEN_URL)
    }

    pub fn with_endpoints(
        config: &RedditConfig,
        api_base: &str,
        token_url: &str,
    ) -> Result<Self, CoreError> {
        let client_id = config
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "reddit.client_id".to_string(),
            })?;
        let client_secret = config
            .client_secret
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "reddit.client_secret".to_string(),
            })?;

        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api: RedditApiClient::with_base_url(http.clone(), api_base),
            auth: TokenManager::with_token_url(client_id, client_secret, http, token_url)?,
            max_comments: MAX_MATCHING_COMMENTS,
        })
    }

    /// Zero disables comment expansion.
    pub fn with_max_comments(mut self, max_comments: usize) -> Self {
        self.max_comments = max_comments;
        self
    }

    pub fn api(&self) -> &RedditApiClient {
        &self.api
    }

    /// Runs `call` with a token, re-authenticating once if Reddit rejects it.
    async fn with_token<T, F, Fut>(&self, call: F) -> Result<T, CoreError>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let token = self.auth.access_token().await?;
        match call(token).await {
            Err(CoreError::RedditApi(RedditApiError::InvalidToken)) => {
                debug!("Reddit rejected the access token, re-authenticating");
                self.auth.invalidate().await;
                let token = self.auth.access_token().await?;
                call(token).await
            }
            other => other,
        }
    }

    async fn matching_comments(
        &self,
        token: &str,
        submission: &Post,
        keywords: &[String],
    ) -> Vec<Post> {
        if self.max_comments == 0 {
            return Vec::new();
        }

        let comments = match self
            .api
            .comments(token, &submission.id, COMMENT_FETCH_LIMIT)
            .await
        {
            Ok(comments) => comments,
            Err(e) => {
                warn!(
                    post_id = %submission.id,
                    code = %e.error_code(),
                    "Could not fetch comments: {}", e
                );
                return Vec::new();
            }
        };

        comments
            .into_iter()
            .filter(|c| {
                c.body
                    .as_deref()
                    .is_some_and(|body| !matched_keywords(body, keywords).is_empty())
            })
            .filter_map(|c| match comment_to_post(c, submission) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!("Skipping comment in {}: {}", submission.id, e);
                    None
                }
            })
            .take(self.max_comments)
            .collect()
    }
}

#[async_trait]
impl PostSource for RedditSource {
    async fn search_by_keywords<'a>(
        &'a self,
        query: &SearchQuery,
    ) -> Result<PostStream<'a>, CoreError> {
        let keywords: Vec<String> = query
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect();
        if keywords.is_empty() {
            return Ok(stream::empty().boxed());
        }

        let listing = self
            .with_token(|token| async move { self.api.search(&token, query).await })
            .await?;
        let token = self.auth.access_token().await?;

        info!(
            "Processing {} search results for {} keywords",
            listing.data.children.len(),
            keywords.len()
        );

        let posts = try_stream! {
            for child in listing.data.children {
                if child.kind != "t3" {
                    continue;
                }
                let submission = match Post::try_from(child.data) {
                    Ok(post) => post,
                    Err(e) => {
                        warn!("Skipping search result: {}", e);
                        continue;
                    }
                };

                if matched_keywords(&submission.full_text(), &keywords).is_empty() {
                    debug!("Search result {} does not contain a keyword", submission.id);
                    continue;
                }

                let comments = self.matching_comments(&token, &submission, &keywords).await;
                yield submission;
                for comment in comments {
                    yield comment;
                }
            }
        };

        Ok(posts.boxed())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>, CoreError> {
        let data = self
            .with_token(|token| async move { self.api.submission(&token, id).await })
            .await?;

        match data {
            Some(data) => Ok(Some(Post::try_from(data)?)),
            None => Ok(None),
        }
    }
}
