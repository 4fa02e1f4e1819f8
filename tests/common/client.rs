//! Test client for sending queries.

use base64::prelude::*;
use reqwest::StatusCode;
use serde_json::{Value, json};

/// A response reduced to what tests assert on.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: reqwest::header::HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `detail` field of an error body.
    pub fn detail(&self) -> &str {
        self.body["detail"].as_str().unwrap_or_default()
    }
}

/// HTTP client bound to one test server.
pub struct TestClient {
    http: reqwest::Client,
    base: String,
    basic: Option<String>,
}

impl TestClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into(),
            basic: None,
        }
    }

    /// Send HTTP Basic credentials with every request.
    pub fn with_basic(mut self, username: &str, password: &str) -> Self {
        self.basic = Some(format!(
            "Basic {}",
            BASE64_STANDARD.encode(format!("{username}:{password}"))
        ));
        self
    }

    /// POST `{"query": query}` plus any extra body fields.
    pub async fn query(&self, route: &str, query: &str, extra: Value) -> TestResponse {
        let mut body = json!({ "query": query });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            body.extend(extra.clone());
        }
        self.send(self.request(reqwest::Method::POST, route).json(&body))
            .await
    }

    /// POST `query` with `key` in the `api-key` header rather than the body.
    pub async fn query_with_header(&self, route: &str, query: &str, key: &str) -> TestResponse {
        self.send(
            self.request(reqwest::Method::POST, route)
                .header("api-key", key)
                .json(&json!({ "query": query })),
        )
        .await
    }

    /// POST a raw, possibly malformed, body.
    pub async fn post_raw(&self, route: &str, body: &'static str) -> TestResponse {
        self.send(
            self.request(reqwest::Method::POST, route)
                .header("content-type", "application/json")
                .body(body),
        )
        .await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(self.request(reqwest::Method::GET, path)).await
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base, path));
        match &self.basic {
            Some(value) => builder.header("authorization", value),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> TestResponse {
        let response = builder.send().await.expect("Failed to send request");
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await.expect("Failed to read body");
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }
}
