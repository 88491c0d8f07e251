//! Google Gemini `streamGenerateContent` client (server-sent events).

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Value, json};

use super::{ChatModel, GenerationRequest, TextStream};
use crate::context::ProviderContent;
use crate::entities::Role;
use crate::providers::{ProviderError, check_status, trim_base_url};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
            base_url: trim_base_url(base_url),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

/// Request body for `streamGenerateContent`.
///
/// System-role messages are folded into `systemInstruction`; Gemini only
/// knows `user` and `model` turns.
pub(crate) fn request_body(request: &GenerationRequest) -> Value {
    let mut system_text = request.system_prompt.clone();
    let mut contents = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let role = match message.role {
            Role::System => {
                if !system_text.is_empty() {
                    system_text.push_str("\n\n");
                }
                system_text.push_str(message.content.text());
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };

        let parts: Vec<Value> = match &message.content {
            ProviderContent::Text(text) => vec![json!({ "text": text })],
            ProviderContent::Multipart { text, files } => {
                let mut parts = Vec::with_capacity(files.len() + 1);
                if !text.is_empty() {
                    parts.push(json!({ "text": text }));
                }
                parts.extend(files.iter().map(|file| {
                    json!({
                        "inlineData": {
                            "mimeType": file.mime_type,
                            "data": BASE64.encode(&file.data),
                        }
                    })
                }));
                parts
            }
        };
        contents.push(json!({ "role": role, "parts": parts }));
    }

    let mut generation_config = json!({ "maxOutputTokens": request.max_output_tokens });
    if let Some(temperature) = request.temperature {
        generation_config["temperature"] = json!(temperature);
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": generation_config,
    });
    if !system_text.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system_text }] });
    }
    body
}

/// Interprets one SSE line.  `Ok(None)` means the line carries no text.
fn parse_sse_line(line: &str) -> Result<Option<String>, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let event: Value = serde_json::from_str(data).map_err(|e| ProviderError::Decode(e.to_string()))?;
    if let Some(error) = event.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(ProviderError::Stream(message.to_owned()));
    }

    let text: String = event["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();
    Ok((!text.is_empty()).then_some(text))
}

type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Splits the byte stream into lines and yields the text of each event.
fn sse_text_stream(bytes: ByteStream) -> TextStream {
    let state = (bytes, Vec::<u8>::new(), false);
    stream::try_unfold(state, |(mut bytes, mut buffer, mut finished)| async move {
        loop {
            if let Some(i) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=i).collect();
                let line = String::from_utf8_lossy(&line);
                if let Some(text) = parse_sse_line(line.trim())? {
                    return Ok(Some((text, (bytes, buffer, finished))));
                }
                continue;
            }

            if finished {
                // Trailing event without a final newline.
                if buffer.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8_lossy(&buffer).into_owned();
                buffer.clear();
                if let Some(text) = parse_sse_line(line.trim())? {
                    return Ok(Some((text, (bytes, buffer, finished))));
                }
                return Ok(None);
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(ProviderError::Stream(e.to_string())),
                None => finished = true,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured("gemini"))?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request_body(request))
            .send()
            .await?;
        let response = check_status(response).await?;

        tracing::debug!(model = %self.model, "gemini stream opened");
        Ok(sse_text_stream(response.bytes_stream().boxed()))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::ProviderMessage;
    use crate::context::content::InlineFile;
    use futures::TryStreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(messages: Vec<ProviderMessage>) -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are helpful.".into(),
            messages,
            max_output_tokens: 4096,
            temperature: None,
        }
    }

    fn text(role: Role, t: &str) -> ProviderMessage {
        ProviderMessage { role, content: ProviderContent::Text(t.into()) }
    }

    fn sse(events: &[&str]) -> String {
        events
            .iter()
            .map(|t| {
                format!(
                    "data: {}\r\n\r\n",
                    json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": t }] } }] })
                )
            })
            .collect()
    }

    #[test]
    fn body_maps_roles_and_system_messages() {
        let body = request_body(&request(vec![
            text(Role::System, "User memory/context:\nlikes tea"),
            text(Role::User, "hi"),
            text(Role::Assistant, "hello"),
        ]));

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are helpful.\n\nUser memory/context:\nlikes tea"
        );
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert!(body["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn body_inlines_files() {
        let message = ProviderMessage {
            role: Role::User,
            content: ProviderContent::Multipart {
                text: "what is this?".into(),
                files: vec![InlineFile { data: vec![1, 2, 3], mime_type: "image/png".into(), name: None }],
            },
        };
        let mut req = request(vec![message]);
        req.temperature = Some(0.5);
        let body = request_body(&req);

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "what is this?");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn sse_lines_are_interpreted() {
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(
            parse_sse_line(r#"data: {"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#).unwrap(),
            Some("ab".into())
        );
        assert_eq!(parse_sse_line(r#"data: {"candidates":[{"finishReason":"STOP"}]}"#).unwrap(), None);
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"quota"}}"#),
            Err(ProviderError::Stream(m)) if m == "quota"
        ));
        assert!(matches!(parse_sse_line("data: {oops"), Err(ProviderError::Decode(_))));
    }

    #[tokio::test]
    async fn streams_text_deltas() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse(&["Hel", "lo", "!"])),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new(Some("test-key".into()), DEFAULT_MODEL, &server.uri());
        let chunks: Vec<String> = client
            .stream(&request(vec![text(Role::User, "hi")]))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks, vec!["Hel", "lo", "!"]);
    }

    #[tokio::test]
    async fn trailing_event_without_newline_is_read() {
        let server = MockServer::start().await;
        let body = format!(
            "{}data: {}",
            sse(&["a"]),
            json!({ "candidates": [{ "content": { "parts": [{ "text": "b" }] } }] })
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = GeminiClient::new(Some("k".into()), DEFAULT_MODEL, &server.uri());
        let chunks: Vec<String> = client
            .stream(&request(vec![text(Role::User, "hi")]))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn non_success_status_fails_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(Some("k".into()), DEFAULT_MODEL, &server.uri());
        match client.stream(&request(vec![text(Role::User, "hi")])).await {
            Err(ProviderError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn missing_api_key_is_reported() {
        let client = GeminiClient::new(None, DEFAULT_MODEL, DEFAULT_BASE_URL);
        assert!(matches!(
            client.stream(&request(vec![])).await,
            Err(ProviderError::NotConfigured("gemini"))
        ));
    }
}
