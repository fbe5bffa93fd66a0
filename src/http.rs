use reqwest::Client;
use std::time::Duration;

/// Client for chat-completion, scraping, and media transfer calls.
/// Connect timeout only; the request body itself may run long.
pub fn build_client() -> Client {
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for the validation and moderation judges: hard total timeout so
/// a slow upstream cannot hold a product write open.
pub fn build_judge_client() -> Client {
    let timeout = std::env::var("JUDGE_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(10);
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| Client::new())
}
