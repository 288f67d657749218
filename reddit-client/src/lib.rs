//! Reddit REST client and the `PostSource` built on it.

pub mod api;
pub mod auth;
pub mod rate_limiter;
pub mod source;

pub use api::{RedditApiClient, RedditCommentData, RedditListing, RedditPostData};
pub use auth::TokenManager;
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
pub use source::{RedditSource, MAX_MATCHING_COMMENTS};

#[cfg(test)]
mod tests;
