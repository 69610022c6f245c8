//! Stripe Checkout Sessions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;
use url::Url;

use super::{CheckoutError, CheckoutProvider, CheckoutRequest, CheckoutSession};
use crate::config::StripeConfig;

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    api_url: Url,
    secret_key: String,
    site_url: Url,
}

impl StripeClient {
    pub fn new(config: &StripeConfig, site_url: &Url) -> Result<Self, CheckoutError> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            secret_key: config.secret_key.clone(),
            site_url: site_url.clone(),
        })
    }

    fn form(&self, request: &CheckoutRequest) -> Result<Vec<(String, String)>, CheckoutError> {
        // Stripe substitutes the placeholder itself, so it must stay unescaped
        let success_url = format!(
            "{}?session_id={{CHECKOUT_SESSION_ID}}",
            self.site_url.join("checkout/success")?
        );
        let cancel_url = self
            .site_url
            .join(&format!("compositions/{}", request.composition_id))?;

        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), success_url),
            ("cancel_url".to_string(), cancel_url.to_string()),
            ("line_items[0][quantity]".to_string(), request.quantity.to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.title.clone(),
            ),
            (
                "metadata[composition_id]".to_string(),
                request.composition_id.clone(),
            ),
        ];
        if let Some(image) = &request.image_url {
            form.push((
                "line_items[0][price_data][product_data][images][0]".to_string(),
                image.clone(),
            ));
        }
        Ok(form)
    }
}

#[async_trait]
impl CheckoutProvider for StripeClient {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, CheckoutError> {
        let url = self.api_url.join("checkout/sessions")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.secret_key)
            .form(&self.form(request)?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(CheckoutError::Provider {
                status: status.as_u16(),
                message: body["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }

        let session: CheckoutSession = response.json().await?;
        info!(
            session_id = %session.id,
            composition_id = %request.composition_id,
            "Checkout session created"
        );
        Ok(session)
    }
}
