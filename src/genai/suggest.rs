//! PromptSuggester - expands a rough idea into detailed video prompts.

use serde::Deserialize;

use super::client::{
    ClientError, Content, GenAiClient, GenerateContentRequest, GenerationSettings, InlineData, Part,
};
use crate::media::ImageInput;

/// System instruction sent with every suggestion request.
pub const SUGGESTION_SYSTEM_INSTRUCTION: &str = "You are an expert video director and prompt engineer. Your goal is to take a user's simple idea and expand it into three distinct, highly detailed, and creative prompts for a video generation AI. Each prompt should be a single paragraph and focus on visual details, camera movements, lighting, and mood. If an image is provided, your suggestions MUST be based on the visual content, style, and mood of the image, incorporating the user's text idea. Provide your response as a JSON object with a single key \"prompts\" which contains an array of three string prompts.";

/// Errors that can occur while requesting suggestions.
#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("Invalid response format from prompt suggestion API.")]
    InvalidFormat,
}

#[derive(Debug, Deserialize)]
struct SuggestionPayload {
    #[serde(default)]
    prompts: Option<Vec<String>>,
}

/// Build the user-facing instruction text for an idea.
fn compose_prompt_text(idea: &str, has_image: bool) -> String {
    let mut text = String::from("Generate 3 video prompts.");
    if !idea.is_empty() {
        text.push_str(&format!(" The user's idea is: \"{}\".", idea));
    }
    if has_image {
        text.push_str(" Base your suggestions on the provided image.");
    }
    text
}

fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "prompts": {
                "type": "ARRAY",
                "description": "An array of 3 distinct, creative, and detailed video prompt suggestions.",
                "items": {
                    "type": "STRING",
                    "description": "A single paragraph video prompt."
                }
            }
        },
        "required": ["prompts"]
    })
}

/// Parse the model's JSON text into a non-empty prompt list.
fn parse_prompts(text: &str) -> Result<Vec<String>, SuggestionError> {
    let payload: SuggestionPayload =
        serde_json::from_str(text.trim()).map_err(|_| SuggestionError::InvalidFormat)?;

    match payload.prompts {
        Some(prompts) if !prompts.is_empty() => Ok(prompts),
        _ => Err(SuggestionError::InvalidFormat),
    }
}

/// Requests prompt suggestions from the text model.
#[derive(Debug, Clone)]
pub struct PromptSuggester {
    client: GenAiClient,
}

impl PromptSuggester {
    pub fn new(client: GenAiClient) -> Self {
        Self { client }
    }

    /// Ask for three detailed prompts based on an idea and/or image.
    ///
    /// Returns an empty list without contacting the API when there is
    /// neither an idea nor an image.
    pub async fn suggest(
        &self,
        idea: &str,
        image: Option<&ImageInput>,
    ) -> Result<Vec<String>, SuggestionError> {
        let idea = idea.trim();
        if idea.is_empty() && image.is_none() {
            return Ok(Vec::new());
        }

        let mut parts = vec![Part {
            text: Some(compose_prompt_text(idea, image.is_some())),
            ..Default::default()
        }];
        if let Some(image) = image {
            parts.push(Part {
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: image.bytes_base64.clone(),
                }),
                ..Default::default()
            });
        }

        let request = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(SUGGESTION_SYSTEM_INSTRUCTION.to_string()),
                    ..Default::default()
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts,
            }],
            generation_config: GenerationSettings {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        log::info!("Requesting prompt suggestions (image: {})", image.is_some());
        let response = self.client.generate_content(&request).await.map_err(|e| {
            log::error!("Error generating prompt suggestions: {}", e);
            e
        })?;

        let prompts = parse_prompts(&response.text())?;
        log::info!("Received {} prompt suggestions", prompts.len());
        Ok(prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt_text_idea_only() {
        assert_eq!(
            compose_prompt_text("a cat", false),
            "Generate 3 video prompts. The user's idea is: \"a cat\"."
        );
    }

    #[test]
    fn test_compose_prompt_text_image_only() {
        assert_eq!(
            compose_prompt_text("", true),
            "Generate 3 video prompts. Base your suggestions on the provided image."
        );
    }

    #[test]
    fn test_parse_prompts_valid() {
        let prompts = parse_prompts(r#" {"prompts": ["a", "b", "c"]} "#).unwrap();
        assert_eq!(prompts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_parse_prompts_empty_list_is_invalid() {
        assert!(matches!(
            parse_prompts(r#"{"prompts": []}"#),
            Err(SuggestionError::InvalidFormat)
        ));
    }

    #[test]
    fn test_parse_prompts_missing_key_is_invalid() {
        assert!(matches!(
            parse_prompts(r#"{"ideas": ["a"]}"#),
            Err(SuggestionError::InvalidFormat)
        ));
    }

    #[test]
    fn test_parse_prompts_not_json() {
        assert!(matches!(
            parse_prompts("Sure! Here are three prompts"),
            Err(SuggestionError::InvalidFormat)
        ));
    }

    #[tokio::test]
    async fn test_suggest_empty_input_short_circuits() {
        // Unroutable base URL: any request would fail
        let client =
            GenAiClient::with_base_url("k".to_string(), "http://127.0.0.1:9".to_string()).unwrap();
        let suggester = PromptSuggester::new(client);

        let prompts = suggester.suggest("   ", None).await.unwrap();
        assert!(prompts.is_empty());
    }

    mod mock_http_tests {
        use super::*;
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

        fn candidate_body(text: &str) -> serde_json::Value {
            serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
            })
        }

        #[tokio::test]
        async fn test_suggest_sends_idea_and_schema() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .and(header("x-goog-api-key", "test-api-key"))
                .and(body_partial_json(serde_json::json!({
                    "contents": [{
                        "role": "user",
                        "parts": [{"text": "Generate 3 video prompts. The user's idea is: \"a lighthouse in a storm\"."}]
                    }],
                    "generationConfig": {"responseMimeType": "application/json"}
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body(
                    r#"{"prompts": ["one", "two", "three"]}"#,
                )))
                .expect(1)
                .mount(&mock_server)
                .await;

            let client =
                GenAiClient::with_base_url("test-api-key".to_string(), mock_server.uri()).unwrap();
            let prompts = PromptSuggester::new(client)
                .suggest("  a lighthouse in a storm ", None)
                .await
                .unwrap();

            assert_eq!(prompts, vec!["one", "two", "three"]);
        }

        #[tokio::test]
        async fn test_suggest_sends_inline_image() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .and(body_partial_json(serde_json::json!({
                    "contents": [{
                        "role": "user",
                        "parts": [
                            {"text": "Generate 3 video prompts. Base your suggestions on the provided image."},
                            {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
                        ]
                    }]
                })))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(candidate_body(r#"{"prompts": ["from image"]}"#)),
                )
                .expect(1)
                .mount(&mock_server)
                .await;

            let client =
                GenAiClient::with_base_url("test-api-key".to_string(), mock_server.uri()).unwrap();
            let image = ImageInput {
                bytes_base64: "aGVsbG8=".to_string(),
                mime_type: "image/png".to_string(),
            };
            let prompts = PromptSuggester::new(client)
                .suggest("", Some(&image))
                .await
                .unwrap();

            assert_eq!(prompts, vec!["from image"]);
        }

        #[tokio::test]
        async fn test_suggest_invalid_payload() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(candidate_body(r#"{"prompts": []}"#)),
                )
                .mount(&mock_server)
                .await;

            let client =
                GenAiClient::with_base_url("test-api-key".to_string(), mock_server.uri()).unwrap();
            let result = PromptSuggester::new(client).suggest("idea", None).await;

            assert!(matches!(result, Err(SuggestionError::InvalidFormat)));
        }

        #[tokio::test]
        async fn test_suggest_api_error_carries_message() {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path(GENERATE_PATH))
                .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                    "error": {"code": 400, "message": "API key not valid"}
                })))
                .mount(&mock_server)
                .await;

            let client =
                GenAiClient::with_base_url("test-api-key".to_string(), mock_server.uri()).unwrap();
            let result = PromptSuggester::new(client).suggest("idea", None).await;

            match result {
                Err(SuggestionError::Client(ClientError::Api { status, message })) => {
                    assert_eq!(status, 400);
                    assert_eq!(message, "API key not valid");
                }
                other => panic!("Expected API error, got {:?}", other),
            }
        }
    }
}
