use eyre::{Result, WrapErr, eyre};
use std::env;

/// Runtime settings, read once at startup and handed to the components
/// that need them. Secrets never leave this struct except as request
/// headers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_url: String,
    pub mongodb_db_name: String,
    pub cloudinary_cloud_name: String,
    pub cloudinary_api_key: String,
    pub cloudinary_secret: String,
    pub mistral_api_key: String,
    pub mistral_base_url: String,
    pub media_dir: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            mongodb_url: require("MONGODB_URL")?,
            mongodb_db_name: require("MONGODB_DB_NAME")?,
            cloudinary_cloud_name: env::var("CLOUDINARY_CLOUD_NAME")
                .unwrap_or_else(|_| "dgzv3nira".to_string()),
            cloudinary_api_key: env::var("CLOUDINARY_API_KEY")
                .unwrap_or_else(|_| "621634815674283".to_string()),
            cloudinary_secret: require("CLOUDINARY_SECRET")?,
            mistral_api_key: require("MISTRAL_API_KEY")?,
            mistral_base_url: env::var("MISTRAL_BASE_URL")
                .unwrap_or_else(|_| "https://api.mistral.ai".to_string()),
            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "media".to_string()),
        })
    }
}

fn require(key: &'static str) -> Result<String> {
    let value = env::var(key).wrap_err_with(|| format!("{key} is not set"))?;
    if value.trim().is_empty() {
        return Err(eyre!("{key} is empty"));
    }
    Ok(value)
}
