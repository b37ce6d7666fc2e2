//! Feed post action
//!
//! Posts are created through a [`PostTransport`]. Embedded widgets use
//! [`HttpPostTransport`], which calls the event's widget API with the session
//! credential; mock widgets synthesize posts locally.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WidgetError};

/// Path of the create-post endpoint under the API base URL
pub const POSTS_PATH: &str = "/api/widget-api/posts";

/// Options for a new post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostOptions {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl CreatePostOptions {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }
}

/// A post on the event feed, as returned by the API.
///
/// Fields beyond `id`, `content` and `createdAt` are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub content: String,
    pub created_at: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Credential and endpoint a post is sent with
#[derive(Debug, Clone, Copy)]
pub struct PostTarget<'a> {
    pub endpoint: Option<&'a str>,
    pub credential: &'a str,
}

/// Backend that turns post options into a created post
#[async_trait]
pub trait PostTransport: Send + Sync {
    async fn create_post(&self, target: PostTarget<'_>, options: &CreatePostOptions) -> Result<Post>;
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    post: Post,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Creates posts over HTTP. Single attempt, no retries.
pub struct HttpPostTransport {
    client: Client,
}

impl HttpPostTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| WidgetError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn posts_url(endpoint: &str) -> String {
        format!("{}{}", endpoint, POSTS_PATH)
    }
}

#[async_trait]
impl PostTransport for HttpPostTransport {
    async fn create_post(&self, target: PostTarget<'_>, options: &CreatePostOptions) -> Result<Post> {
        let endpoint = target.endpoint.ok_or(WidgetError::NotInitialized)?;
        let url = Self::posts_url(endpoint);

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", target.credential))
            .json(options)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let status = status.as_u16();
            let body = response.bytes().await.unwrap_or_default();
            let message = serde_json::from_slice::<ErrorResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .and_then(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Failed to create post ({})", status));

            tracing::warn!(status, %message, "Create post request failed");
            return Err(WidgetError::PostRequestFailed { status, message });
        }

        let body: CreatePostResponse = response.json().await?;
        tracing::debug!(post_id = %body.post.id, "Post created");
        Ok(body.post)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpPostTransport {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpPostTransport::with_client(client)
    }

    #[test]
    fn test_images_omitted_when_empty() {
        let body = serde_json::to_value(CreatePostOptions::new("hello")).unwrap();
        assert_eq!(body, json!({"content": "hello"}));

        let body = serde_json::to_value(CreatePostOptions::new("hello").with_image("a")).unwrap();
        assert_eq!(body, json!({"content": "hello", "images": ["a"]}));
    }

    #[tokio::test]
    async fn test_create_post_sends_bearer_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/widget-api/posts"))
            .and(header("authorization", "Bearer a.b.c"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"content": "hi", "images": ["img_1"]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "post": {
                    "id": "post_1",
                    "content": "hi",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "likes": 0
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let target = PostTarget {
            endpoint: Some(&uri),
            credential: "a.b.c",
        };
        let post = transport()
            .create_post(target, &CreatePostOptions::new("hi").with_image("img_1"))
            .await
            .unwrap();

        assert_eq!(post.id, "post_1");
        assert_eq!(post.created_at, "2026-01-01T00:00:00Z");
        assert_eq!(post.extra.get("likes"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_error_message_from_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"error": {"message": "Posting is disabled"}})),
            )
            .mount(&server)
            .await;

        let uri = server.uri();
        let target = PostTarget {
            endpoint: Some(&uri),
            credential: "a.b.c",
        };
        let err = transport()
            .create_post(target, &CreatePostOptions::new("hi"))
            .await
            .unwrap_err();

        match err {
            WidgetError::PostRequestFailed { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Posting is disabled");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unparseable_error_falls_back_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let uri = server.uri();
        let target = PostTarget {
            endpoint: Some(&uri),
            credential: "a.b.c",
        };
        let err = transport()
            .create_post(target, &CreatePostOptions::new("hi"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to create post (502)");
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_not_initialized() {
        let target = PostTarget {
            endpoint: None,
            credential: "a.b.c",
        };
        let err = transport()
            .create_post(target, &CreatePostOptions::new("hi"))
            .await
            .unwrap_err();

        assert!(matches!(err, WidgetError::NotInitialized));
    }
}
