//! Content module - the origin the cache sits in front of.

mod model;
mod notion;

use async_trait::async_trait;

pub use model::Composition;
pub use notion::NotionClient;

/// Errors from the content origin.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("content request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("content API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error("invalid content URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Read access to the composition catalog.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn list_compositions(&self) -> Result<Vec<Composition>, ContentError>;

    /// Whether `id` has the shape of a record id for this source. Callers
    /// reject other ids before any lookup.
    fn is_valid_id(&self, _id: &str) -> bool {
        true
    }

    /// `None` when the id is unknown or the record is archived.
    async fn get_composition(&self, id: &str) -> Result<Option<Composition>, ContentError>;

    async fn compositions_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<Composition>, ContentError>;

    /// Cheap liveness check against the origin.
    async fn ping(&self) -> Result<(), ContentError>;
}
