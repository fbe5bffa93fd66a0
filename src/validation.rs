use crate::llm::mistral::{CHAT_MODEL, ChatMessage, ChatRequest, MistralClient, ResponseFormat};
use serde::Serialize;
use serde_json::Value;
use serde_with::skip_serializing_none;
use tracing::warn;

/// Outcome of the plausibility judge. A missing or unparsable reply is
/// never trusted: the product stays unvalidated and the reason travels
/// with the verdict.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ValidationVerdict {
    pub validated: bool,
    pub error: Option<String>,
}

impl ValidationVerdict {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            validated: false,
            error: Some(reason.into()),
        }
    }
}

/// Ask the language model whether the product details look correct and
/// non-fraudulent. The call runs on the judge client (10-second budget)
/// and never propagates an error past this boundary.
pub async fn check_product(llm: &MistralClient, product: &Value) -> ValidationVerdict {
    let request = ChatRequest {
        model: CHAT_MODEL.clone(),
        messages: vec![ChatMessage::user(judge_prompt(product))],
        response_format: Some(ResponseFormat::json_object()),
        max_tokens: None,
    };

    let completion = match llm.chat_judged(&request).await {
        Ok(completion) => completion,
        Err(err) => {
            warn!(target = "catalog.llm", error = %err, "product_validation_request_failed");
            return ValidationVerdict::rejected("API request failed");
        }
    };

    match completion.first_content().and_then(parse_verdict) {
        Some(validated) => ValidationVerdict {
            validated,
            error: None,
        },
        None => {
            warn!(target = "catalog.llm", "product_validation_unparsable_reply");
            ValidationVerdict::rejected("Invalid API response format")
        }
    }
}

fn judge_prompt(product: &Value) -> String {
    format!(
        "Product description: {product}\n\
         Check if the product details are correct and not fraudulent.\n\
         Respond with the attributes in JSON format:\n\
         {{\n    \"validated\": bool\n}}"
    )
}

// A reply that parses but omits the key counts as a rejection, not an
// error; only unparsable content is reported upstream.
fn parse_verdict(content: &str) -> Option<bool> {
    let value: Value = serde_json::from_str(content).ok()?;
    Some(
        value
            .get("validated")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_verdict_reads_boolean() {
        assert_eq!(parse_verdict(r#"{"validated": true}"#), Some(true));
        assert_eq!(parse_verdict(r#"{"validated": false}"#), Some(false));
    }

    #[test]
    fn parse_verdict_defaults_missing_key_to_false() {
        assert_eq!(parse_verdict(r#"{"confidence": 0.9}"#), Some(false));
        assert_eq!(parse_verdict(r#"{"validated": "yes"}"#), Some(false));
    }

    #[test]
    fn parse_verdict_rejects_non_json() {
        assert_eq!(parse_verdict("the product looks fine"), None);
        assert_eq!(parse_verdict(""), None);
    }

    #[test]
    fn judge_prompt_embeds_product_fields() {
        let product = json!({"product_name": "Desk Lamp", "price": 3499});
        let prompt = judge_prompt(&product);
        assert!(prompt.contains("Desk Lamp"));
        assert!(prompt.contains("not fraudulent"));
        assert!(prompt.contains("\"validated\": bool"));
    }

    #[test]
    fn rejected_verdict_carries_reason() {
        let verdict = ValidationVerdict::rejected("API request failed");
        assert!(!verdict.validated);
        assert_eq!(verdict.error.as_deref(), Some("API request failed"));
    }

    #[tokio::test]
    async fn unreachable_upstream_rejects_the_product() {
        // Nothing listens on port 9; the request fails without leaving
        // the machine and the product must stay unvalidated.
        let llm = MistralClient::new(crate::llm::MistralConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "test".into(),
        });
        let verdict = check_product(&llm, &json!({"product_name": "Desk Lamp"})).await;
        assert!(!verdict.validated);
        assert_eq!(verdict.error.as_deref(), Some("API request failed"));
    }
}
