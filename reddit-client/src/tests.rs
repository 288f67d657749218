use crate::RedditSource;
use brandwatch_core::{
    CoreError, ErrorExt, FaultKind, PostKind, PostSource, Recency, RedditApiError, RedditConfig,
    SearchQuery,
};
use futures::StreamExt;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> RedditConfig {
    RedditConfig {
        client_id: Some("client".to_string()),
        client_secret: Some("secret".to_string()),
        user_agent: "brandwatch-tests/0.1".to_string(),
    }
}

fn query(keywords: &[&str], subreddits: &[&str]) -> SearchQuery {
    SearchQuery {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        subreddits: subreddits.iter().map(|s| s.to_string()).collect(),
        limit: 25,
        recency: Recency::Day,
    }
}

fn submission(id: &str, title: &str, selftext: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": title,
            "selftext": selftext,
            "author": "poster",
            "subreddit": "gadgets",
            "url": format!("https://www.reddit.com/r/gadgets/comments/{id}/"),
            "permalink": format!("/r/gadgets/comments/{id}/"),
            "created_utc": 1_700_000_000.0,
            "score": 12,
            "num_comments": 3
        }
    })
}

fn listing(children: Vec<Value>) -> Value {
    json!({"kind": "Listing", "data": {"children": children, "after": null, "before": null}})
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .and(header("user-agent", "brandwatch-tests/0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "bearer",
            "expires_in": 3600,
            "scope": "*"
        })))
        .mount(server)
        .await;
}

fn source(server: &MockServer) -> RedditSource {
    RedditSource::with_endpoints(
        &config(),
        &server.uri(),
        &format!("{}/api/v1/access_token", server.uri()),
    )
    .unwrap()
}

#[test]
fn test_missing_credentials_is_config_error() {
    let mut config = config();
    config.client_id = None;
    assert!(matches!(
        RedditSource::new(&config),
        Err(CoreError::Config(_))
    ));
}

#[tokio::test]
async fn test_search_yields_matching_posts_and_comments() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/r/gadgets+technology/search"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("q", "\"Acme\""))
        .and(query_param("sort", "new"))
        .and(query_param("t", "day"))
        .and(query_param("restrict_sr", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![
            submission("p1", "Acme phone overheating", ""),
            submission("p2", "Unrelated phone news", "nothing here"),
            json!({"kind": "t3", "data": {"title": "no id or timestamp"}}),
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/comments/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            listing(vec![submission("p1", "Acme phone overheating", "")]),
            listing(vec![
                json!({"kind": "t1", "data": {
                    "id": "c1", "body": "My acme did the same", "author": "a",
                    "subreddit": "gadgets", "permalink": "/r/gadgets/comments/p1/x/c1/",
                    "created_utc": 1_700_000_100.0, "score": 4, "replies": ""
                }}),
                json!({"kind": "t1", "data": {
                    "id": "c2", "body": "Mine is fine", "author": "b",
                    "subreddit": "gadgets", "permalink": "/r/gadgets/comments/p1/x/c2/",
                    "created_utc": 1_700_000_200.0, "score": 1, "replies": ""
                }})
            ])
        ])))
        .mount(&server)
        .await;

    let source = source(&server);
    let query = query(&["Acme"], &["gadgets", "technology"]);
    let posts: Vec<_> = source
        .search_by_keywords(&query)
        .await
        .unwrap()
        .collect()
        .await;

    let posts: Vec<_> = posts.into_iter().map(Result::unwrap).collect();
    let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "c1"]);
    assert_eq!(posts[0].kind, PostKind::Post);
    assert_eq!(posts[1].kind, PostKind::Comment);
    assert_eq!(posts[1].title, "Acme phone overheating");
}

#[tokio::test]
async fn test_all_subreddit_searches_everywhere() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![])))
        .expect(1)
        .mount(&server)
        .await;

    let source = source(&server);
    let posts: Vec<_> = source
        .search_by_keywords(&query(&["Acme"], &["all", "technology"]))
        .await
        .unwrap()
        .collect()
        .await;
    assert!(posts.is_empty());
}

#[tokio::test]
async fn test_empty_keywords_make_no_requests() {
    let server = MockServer::start().await;
    let source = source(&server);

    let posts: Vec<_> = source
        .search_by_keywords(&query(&[" "], &[]))
        .await
        .unwrap()
        .collect()
        .await;

    assert!(posts.is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_is_source_unavailable() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = source(&server);
    let error = match source.search_by_keywords(&query(&["Acme"], &[])).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };

    assert!(matches!(error, CoreError::SourceUnavailable { .. }));
    assert_eq!(error.fault_kind(), FaultKind::SourceUnavailable);
}

#[tokio::test]
async fn test_rate_limit_status_maps_to_reddit_error() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let source = source(&server);
    let error = match source.search_by_keywords(&query(&["Acme"], &[])).await {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    };
    assert!(matches!(
        error,
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: 30 })
    ));
}

#[tokio::test]
async fn test_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "invalid_client"})),
        )
        .mount(&server)
        .await;

    let source = source(&server);
    let error = source.get_by_id("p1").await.unwrap_err();
    assert!(matches!(
        error,
        CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. })
    ));
}

#[tokio::test]
async fn test_get_by_id() {
    let server = MockServer::start().await;
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(query_param("id", "t3_p1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing(vec![submission("p1", "Acme recall", "")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/info"))
        .and(query_param("id", "t3_missing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![])))
        .mount(&server)
        .await;

    let source = source(&server);
    let post = source.get_by_id("p1").await.unwrap().unwrap();
    assert_eq!(post.title, "Acme recall");
    assert!(source.get_by_id("missing").await.unwrap().is_none());
}

#[test]
fn test_token_is_cached_between_calls() {
    tokio_test::block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "cached",
                "token_type": "bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing(vec![])))
            .mount(&server)
            .await;

        let source = source(&server);
        source.get_by_id("a").await.unwrap();
        source.get_by_id("b").await.unwrap();
    });
}
