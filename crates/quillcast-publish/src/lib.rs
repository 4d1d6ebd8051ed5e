//! Distribution of finished articles to WordPress and Shopify.

pub mod error;
pub mod publisher;
mod retry;
pub mod shopify;
pub mod sync;
pub mod wordpress;

pub use error::PublishError;
pub use publisher::{ArticlePost, PublishConfig, Publisher};
pub use shopify::ShopifyClient;
pub use sync::{SyncAdapter, SyncOutcome};
pub use wordpress::WordPressClient;
