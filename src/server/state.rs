//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::CacheStore;
use crate::checkout::CheckoutProvider;
use crate::content::ContentSource;

/// Cloned into every handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub cache: CacheStore,
    pub content: Arc<dyn ContentSource>,
    /// `None` when no payment provider is configured.
    pub checkout: Option<Arc<dyn CheckoutProvider>>,
    pub revalidate_secret: Option<Arc<str>>,
}
