use crate::llm::mistral::{MistralClient, MistralError, ModerationResponse};
use serde_json::Value;
use thiserror::Error;

/// The harm classes that gate content acceptance. Anything else the
/// moderation model reports is ignored.
pub const RELEVANT_CATEGORIES: [&str; 5] = [
    "sexual",
    "hate_and_discrimination",
    "violence_and_threats",
    "dangerous_and_criminal_content",
    "selfharm",
];

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation request failed: {0}")]
    Upstream(#[from] MistralError),
}

#[derive(Debug, Clone, Copy)]
pub struct ModerationVerdict {
    pub inappropriate: bool,
}

/// Run arbitrary JSON content past the moderation endpoint. Transport
/// and decode failures come back as `Err`; callers decide what a
/// missing verdict means for their write path.
pub async fn screen_content(
    llm: &MistralClient,
    content: &Value,
) -> Result<ModerationVerdict, ModerationError> {
    let prompt = format!(
        "Product details: {content}.\n\
         Check if the product details comply with platform guidelines and moderation standards."
    );
    let response = llm.moderate(prompt).await?;
    Ok(evaluate(&response))
}

fn evaluate(response: &ModerationResponse) -> ModerationVerdict {
    let Some(result) = response.results.first() else {
        return ModerationVerdict {
            inappropriate: false,
        };
    };
    let inappropriate = RELEVANT_CATEGORIES
        .iter()
        .any(|category| result.categories.get(*category).copied().unwrap_or(false));
    ModerationVerdict { inappropriate }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with(flags: &[(&str, bool)]) -> ModerationResponse {
        let categories: serde_json::Map<String, Value> = flags
            .iter()
            .map(|(name, flagged)| ((*name).to_string(), Value::Bool(*flagged)))
            .collect();
        serde_json::from_value(json!({"results": [{"categories": categories}]}))
            .expect("deserialize")
    }

    #[test]
    fn all_categories_clear_means_appropriate() {
        let flags: Vec<(&str, bool)> = RELEVANT_CATEGORIES
            .iter()
            .map(|category| (*category, false))
            .collect();
        assert!(!evaluate(&response_with(&flags)).inappropriate);
    }

    #[test]
    fn any_single_category_flags_the_content() {
        for flagged in RELEVANT_CATEGORIES {
            let flags: Vec<(&str, bool)> = RELEVANT_CATEGORIES
                .iter()
                .map(|category| (*category, *category == flagged))
                .collect();
            assert!(
                evaluate(&response_with(&flags)).inappropriate,
                "{flagged} should flag the content"
            );
        }
    }

    #[test]
    fn unknown_categories_are_ignored() {
        let verdict = evaluate(&response_with(&[("law_and_privacy", true)]));
        assert!(!verdict.inappropriate);
    }

    #[test]
    fn empty_results_are_not_flagged() {
        let response: ModerationResponse =
            serde_json::from_value(json!({"results": []})).expect("deserialize");
        assert!(!evaluate(&response).inappropriate);
    }

    #[tokio::test]
    async fn unreachable_upstream_surfaces_as_error() {
        let llm = MistralClient::new(crate::llm::MistralConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: "test".into(),
        });
        let result = screen_content(&llm, &json!({"product_name": "Desk Lamp"})).await;
        assert!(matches!(result, Err(ModerationError::Upstream(_))));
    }
}
