use crate::llm::mistral::{
    CHAT_MODEL, ChatCompletion, ChatMessage, ChatRequest, ContentPart, MistralClient,
    ResponseFormat, VISION_MODEL,
};
use thiserror::Error;
use tracing::info;

const DESCRIBE_INSTRUCTION: &str = "Describe the product in this image such that a customer \
     would understand it. Also tell the products color, brand, and any other details you can see.";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no media available for analysis")]
    NoMedia,
    #[error("image description failed: {0}")]
    Describe(String),
    #[error("attribute generation failed: {0}")]
    Attributes(String),
}

/// Result of the two-call extraction: the vision model's free-text
/// description plus the raw completion envelope from the attribute call.
/// Callers dig the structured attributes out of the envelope themselves.
#[derive(Debug, Clone)]
pub struct PostAnalysis {
    pub description: String,
    pub attributes: ChatCompletion,
    pub image: Vec<String>,
}

/// Two sequential model calls: describe the first image, then turn the
/// description plus caption into structured product attributes. A failed
/// first call aborts the whole extraction; there is no partial retry.
pub async fn analyze_post(
    llm: &MistralClient,
    media_urls: &[String],
    caption: &str,
) -> Result<PostAnalysis, ExtractError> {
    let first = media_urls.first().ok_or(ExtractError::NoMedia)?;

    let describe = ChatRequest {
        model: VISION_MODEL.clone(),
        messages: vec![ChatMessage::user_parts(vec![
            ContentPart::Text {
                text: DESCRIBE_INSTRUCTION.into(),
            },
            ContentPart::ImageUrl {
                image_url: first.clone(),
            },
        ])],
        response_format: None,
        max_tokens: Some(300),
    };
    let described = llm
        .chat(&describe)
        .await
        .map_err(|err| ExtractError::Describe(err.to_string()))?;
    let description = described.first_content().unwrap_or_default().to_string();

    info!(
        target = "catalog.social",
        description_len = description.len(),
        "image_described"
    );

    let attributes_request = ChatRequest {
        model: CHAT_MODEL.clone(),
        messages: vec![ChatMessage::user(attributes_prompt(&description, caption))],
        response_format: Some(ResponseFormat::json_object()),
        max_tokens: None,
    };
    let attributes = llm
        .chat(&attributes_request)
        .await
        .map_err(|err| ExtractError::Attributes(err.to_string()))?;

    Ok(PostAnalysis {
        description,
        attributes,
        image: media_urls.to_vec(),
    })
}

fn attributes_prompt(description: &str, caption: &str) -> String {
    format!(
        "Image description: {description},\n\
         Post caption: {caption}\n\
         Ignore the hashtags and emojis in the caption do not include those in any response.\n\
         Based on the above details generate the following attributes (whichever are possible) \
         for this product.\n\
         \n\
         product_name: str\n\
         product_description: str\n\
         category: str\n\
         brand: str\n\
         color: str\n\
         dynamic_attributes: {{str : str}} (any other details)\n\
         \n\
         Respond the attributes in a json format"
    )
}
