use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;
use url::Url;

// Shown while the classifier is unreachable, matches the service's "normal" line.
pub const DEFAULT_EMPATHY_LINE: &str = "You're not alone — matching you with nearby helpers 💜";
pub const DEFAULT_URGENCY: &str = "normal";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SafetyFilterResponse {
    #[serde(rename = "textRedacted")]
    pub text_redacted: String,
    pub flags: IndexMap<String, bool>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SafetyClassifyResponse {
    pub urgency: String,
    pub empathy: String,
}

fn make_headers(api_key: &str) -> Result<HeaderMap, String> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if !api_key.is_empty() {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| format!("Failed to insert header: {}", e))?);
    }
    Ok(headers)
}

async fn post_json(
    client: &reqwest::Client,
    endpoint_base: &str,
    path: &str,
    api_key: &str,
    body: serde_json::Value,
) -> Result<serde_json::Value, String> {
    let url = Url::parse(endpoint_base)
        .and_then(|u| u.join(path))
        .map_err(|e| format!("Invalid safety endpoint {:?}: {}", endpoint_base, e))?;
    let headers = make_headers(api_key)?;
    let response = client
        .post(url.clone())
        .headers(headers)
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("{} failed: {}", url, e))?;
    let status = response.status();
    let response_txt = response.text().await
        .map_err(|e| format!("reading from {}: {}", url, e))?;
    if !status.is_success() {
        return Err(format!("{} status={} text {}", url, status, response_txt));
    }
    serde_json::from_str(&response_txt)
        .map_err(|e| format!("{} deserialize error: {}", url, e))
}

pub async fn filter_message(
    client: &reqwest::Client,
    endpoint_base: &str,
    api_key: &str,
    text: &str,
) -> Result<SafetyFilterResponse, String> {
    let value = post_json(client, endpoint_base, "/chat/filter", api_key, json!({"text": text})).await?;
    serde_json::from_value(value).map_err(|e| format!("unexpected /chat/filter response: {}", e))
}

pub async fn classify_message(
    client: &reqwest::Client,
    endpoint_base: &str,
    api_key: &str,
    message: &str,
) -> Result<SafetyClassifyResponse, String> {
    let value = post_json(client, endpoint_base, "/classify", api_key, json!({"message": message})).await?;
    serde_json::from_value(value).map_err(|e| format!("unexpected /classify response: {}", e))
}

// Fail open: an unreachable filter must not block someone asking for help,
// the original text goes out and the degradation is logged.
pub async fn filter_message_or_fail_open(
    client: &reqwest::Client,
    endpoint_base: &str,
    api_key: &str,
    text: &str,
) -> SafetyFilterResponse {
    match filter_message(client, endpoint_base, api_key, text).await {
        Ok(response) => response,
        Err(e) => {
            error!("safety filter unavailable, sending unredacted text: {}", e);
            SafetyFilterResponse {
                text_redacted: text.to_string(),
                flags: IndexMap::new(),
            }
        }
    }
}

pub async fn classify_message_or_fail_open(
    client: &reqwest::Client,
    endpoint_base: &str,
    api_key: &str,
    message: &str,
) -> SafetyClassifyResponse {
    match classify_message(client, endpoint_base, api_key, message).await {
        Ok(response) => response,
        Err(e) => {
            error!("urgency classification unavailable, using defaults: {}", e);
            SafetyClassifyResponse {
                urgency: DEFAULT_URGENCY.to_string(),
                empathy: DEFAULT_EMPATHY_LINE.to_string(),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filter_parses_redacted_text_and_flags() {
        let _m = mockito::mock("POST", "/chat/filter")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"textRedacted": "call me at [hidden-phone]", "flags": {"hadPhone": true, "hadEmail": false}}"#)
            .create();

        let client = reqwest::Client::new();
        let response = filter_message(&client, &mockito::server_url(), "", "call me at 555-1234").await.unwrap();
        assert_eq!(response.text_redacted, "call me at [hidden-phone]");
        assert_eq!(response.flags.get("hadPhone"), Some(&true));
        assert_eq!(response.flags.get("hadEmail"), Some(&false));
    }

    #[tokio::test]
    async fn test_filter_fails_open_with_original_text() {
        let _m = mockito::mock("POST", "/chat/filter")
            .with_status(500)
            .create();

        let client = reqwest::Client::new();
        let response = filter_message_or_fail_open(&client, &mockito::server_url(), "", "hello there").await;
        assert_eq!(response.text_redacted, "hello there");
        assert!(response.flags.is_empty());
    }

    #[tokio::test]
    async fn test_classify_parses_urgency_and_empathy() {
        let _m = mockito::mock("POST", "/classify")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"urgency": "urgent", "empathy": "Hang in there — someone nearby will respond soon 💛"}"#)
            .create();

        let client = reqwest::Client::new();
        let response = classify_message(&client, &mockito::server_url(), "", "I need a pad urgently").await.unwrap();
        assert_eq!(response.urgency, "urgent");
        assert!(response.empathy.starts_with("Hang in there"));
    }

    #[tokio::test]
    async fn test_classify_fails_open_with_default_line() {
        let _m = mockito::mock("POST", "/classify")
            .with_status(503)
            .create();

        let client = reqwest::Client::new();
        let response = classify_message_or_fail_open(&client, &mockito::server_url(), "", "I need help").await;
        assert_eq!(response.urgency, "normal");
        assert_eq!(response.empathy, DEFAULT_EMPATHY_LINE);
    }

    #[tokio::test]
    async fn test_api_key_goes_out_as_bearer() {
        let m = mockito::mock("POST", "/chat/filter")
            .match_header("authorization", "Bearer sekrit")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"textRedacted": "x", "flags": {}}"#)
            .create();

        let client = reqwest::Client::new();
        filter_message(&client, &mockito::server_url(), "sekrit", "x").await.unwrap();
        m.assert();
    }
}
