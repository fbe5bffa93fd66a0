pub mod extract;
pub mod instagram;

pub use extract::analyze_post;
pub use instagram::InstagramClient;
