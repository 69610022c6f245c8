//! Catalog records served to the front end.

use serde::{Deserialize, Serialize};

/// A composition as listed on the site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub year: Option<i32>,
    pub instrumentation: Option<String>,
    pub duration: Option<String>,
    pub description: Option<String>,
    pub audio_url: Option<String>,
    pub score_url: Option<String>,
    pub image_url: Option<String>,
    /// Score price in the smallest currency unit. `None` means not for sale.
    pub price_cents: Option<i64>,
    pub currency: String,
}

impl Composition {
    pub fn is_purchasable(&self) -> bool {
        self.price_cents.is_some_and(|p| p > 0)
    }

    /// Category comparison used for filtering, case-insensitive.
    pub fn in_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(category.trim()))
    }
}
