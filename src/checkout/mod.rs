//! Checkout module - hosted payment sessions for score purchases.

mod stripe;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use stripe::StripeClient;

use crate::content::Composition;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("checkout request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("invalid checkout URL: {0}")]
    Url(#[from] url::ParseError),
}

/// What is being bought.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub composition_id: String,
    pub title: String,
    pub unit_amount: i64,
    pub currency: String,
    pub quantity: u32,
    pub image_url: Option<String>,
}

impl CheckoutRequest {
    /// `None` when the composition has no price.
    pub fn for_composition(composition: &Composition, quantity: u32) -> Option<Self> {
        if !composition.is_purchasable() {
            return None;
        }
        Some(Self {
            composition_id: composition.id.clone(),
            title: composition.title.clone(),
            unit_amount: composition.price_cents?,
            currency: composition.currency.clone(),
            quantity: quantity.max(1),
            image_url: composition.image_url.clone(),
        })
    }
}

/// A created session; the client redirects to `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError>;
}
