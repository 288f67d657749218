//! Application-only OAuth for Reddit (client credentials grant).

use brandwatch_core::{CoreError, RedditApiError};
use oauth2::basic::BasicClient;
use oauth2::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError, TokenResponse,
    TokenUrl,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
pub const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are refreshed this long before Reddit says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CachedToken {
    secret: String,
    expires_at: Instant,
}

/// Fetches and caches an application-only access token.
pub struct TokenManager {
    oauth: BasicClient,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(
        client_id: &str,
        client_secret: &str,
        http: reqwest::Client,
    ) -> Result<Self, CoreError> {
        Self::with_token_url(client_id, client_secret, http, REDDIT_TOKEN_URL)
    }

    pub fn with_token_url(
        client_id: &str,
        client_secret: &str,
        http: reqwest::Client,
        token_url: &str,
    ) -> Result<Self, CoreError> {
        let invalid = |e: oauth2::url::ParseError| {
            CoreError::from(RedditApiError::AuthenticationFailed {
                reason: format!("invalid OAuth URL: {e}"),
            })
        };

        let oauth = BasicClient::new(
            ClientId::new(client_id.to_string()),
            Some(ClientSecret::new(client_secret.to_string())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(invalid)?,
            Some(TokenUrl::new(token_url.to_string()).map_err(invalid)?),
        );

        Ok(Self {
            oauth,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Current token, fetching a new one when missing or about to expire.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + EXPIRY_MARGIN < token.expires_at {
                return Ok(token.secret.clone());
            }
            debug!("Reddit access token about to expire, refreshing");
        }

        let token = self.fetch().await?;
        let secret = token.secret.clone();
        *cached = Some(token);
        Ok(secret)
    }

    /// Drops the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    async fn fetch(&self) -> Result<CachedToken, CoreError> {
        let http = self.http.clone();
        let response = self
            .oauth
            .exchange_client_credentials()
            .request_async(|request| send_token_request(http, request))
            .await
            .map_err(|e| match e {
                RequestTokenError::Request(e) => {
                    warn!("Reddit token endpoint unreachable: {}", e);
                    CoreError::source_unavailable("reddit", format!("token endpoint: {e}"))
                }
                RequestTokenError::ServerResponse(e) => {
                    RedditApiError::AuthenticationFailed {
                        reason: e.to_string(),
                    }
                    .into()
                }
                other => RedditApiError::AuthenticationFailed {
                    reason: other.to_string(),
                }
                .into(),
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_LIFETIME);
        info!("Obtained Reddit access token valid for {:?}", lifetime);

        Ok(CachedToken {
            secret: response.access_token().secret().clone(),
            expires_at: Instant::now() + lifetime,
        })
    }
}

/// Sends an oauth2 token request through the shared reqwest client, which
/// carries the Reddit user agent.
async fn send_token_request(
    http: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::POST);

    let mut builder = http.request(method, request.url.as_str()).body(request.body);
    for (name, value) in request.headers.iter() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let response = builder.send().await?;
    let status_code =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in response.headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let body = response.bytes().await?.to_vec();
    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}
