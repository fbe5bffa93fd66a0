pub mod mistral;

pub use mistral::{MistralClient, MistralConfig};
