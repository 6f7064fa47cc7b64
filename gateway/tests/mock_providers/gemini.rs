//! Gemini `generateContent` responders

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_MODEL: &str = "gemini-test";
pub const TEST_API_KEY: &str = "test-gemini-key";

fn generate_path() -> String {
    format!("/v1beta/models/{TEST_MODEL}:generateContent")
}

/// Answer every prompt with `reply`, expecting `calls` requests.
pub async fn mount_reply(server: &MockServer, reply: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .and(header("x-goog-api-key", TEST_API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": reply}]}}]
        })))
        .expect(calls)
        .mount(server)
        .await;
}

/// Fail every request with a backend error.
pub async fn mount_error(server: &MockServer, status: u16, message: &str) {
    Mock::given(method("POST"))
        .and(path(generate_path()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "error": {"code": status, "message": message, "status": "INVALID_ARGUMENT"}
        })))
        .mount(server)
        .await;
}
