//! HTTP handlers. Every catalog read goes through the cache store.

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::cache::{COMPOSITION_NAMESPACE, CacheError, CacheKey, CacheStats};
use crate::checkout::{CheckoutRequest, CheckoutSession};
use crate::content::Composition;

/// Header carrying the shared secret for invalidation hooks.
pub const REVALIDATE_HEADER: &str = "x-revalidate-secret";

const MAX_QUANTITY: u32 = 25;

pub async fn list_compositions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Composition>>, ApiError> {
    let content = &state.content;
    let compositions = state
        .cache
        .fetch_key(&CacheKey::AllCompositions, move || async move {
            content.list_compositions().await.map_err(ApiError::from)
        })
        .await?;
    Ok(Json(compositions))
}

pub async fn get_composition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Composition>, ApiError> {
    Ok(Json(load_composition(&state, &id).await?))
}

/// Cached single-record lookup. Malformed ids are refused before the cache is
/// consulted and unknown ids fail the producer, so absence is never cached.
async fn load_composition(state: &AppState, id: &str) -> Result<Composition, ApiError> {
    if !state.content.is_valid_id(id) {
        return Err(ApiError::NotFound(format!("composition {}", id)));
    }
    let content = &state.content;
    state
        .cache
        .fetch_key(&CacheKey::composition(id), move || async move {
            content
                .get_composition(id)
                .await?
                .ok_or_else(|| ApiError::NotFound(format!("composition {}", id)))
        })
        .await
}

pub async fn compositions_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<Composition>>, ApiError> {
    let key = CacheKey::by_category(&category);
    let (content, category) = (&state.content, category.as_str());
    let compositions = state
        .cache
        .fetch_key(&key, move || async move {
            content
                .compositions_by_category(category)
                .await
                .map_err(ApiError::from)
        })
        .await?;
    Ok(Json(compositions))
}

/// Origin liveness, cached for a short while.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: String,
    pub content_source: String,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
    pub cache: CacheStats,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let content = &state.content;
    let snapshot = state
        .cache
        .fetch_key(&CacheKey::Health, move || async move {
            let reachable = match content.ping().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Content source health check failed");
                    false
                }
            };
            Ok::<_, Infallible>(HealthSnapshot {
                status: if reachable { "ok" } else { "degraded" }.to_string(),
                content_source: if reachable { "ok" } else { "unreachable" }.to_string(),
                checked_at: Utc::now(),
            })
        })
        .await;

    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(never) => match never {},
    };

    Json(HealthResponse {
        snapshot,
        cache: state.cache.stats().await,
    })
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.cache.stats().await)
}

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    pub namespace: Option<String>,
    #[serde(default)]
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub cache_enabled: bool,
    pub namespace: Option<String>,
    pub removed: u64,
}

/// "Content updated" hook: drop cached entries so the next read refetches.
///
/// With an empty body, the whole composition namespace is dropped. A body
/// that is present but not a valid request is rejected.
pub async fn invalidate_cache(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let Some(secret) = state.revalidate_secret.as_deref() else {
        return Err(ApiError::Forbidden("cache invalidation is disabled".to_string()));
    };
    let provided = headers
        .get(REVALIDATE_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided != Some(secret) {
        return Err(ApiError::Unauthorized("invalid revalidation secret".to_string()));
    }

    let request: InvalidateRequest = if body.iter().all(u8::is_ascii_whitespace) {
        InvalidateRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid invalidation request: {}", e)))?
    };
    let namespace = match (&request.namespace, request.keys.is_empty()) {
        (Some(ns), _) => Some(ns.trim().to_string()).filter(|ns| !ns.is_empty()),
        (None, true) => Some(COMPOSITION_NAMESPACE.to_string()),
        (None, false) => None,
    };

    if !state.cache.is_enabled() {
        return Ok(Json(InvalidateResponse {
            cache_enabled: false,
            namespace,
            removed: 0,
        }));
    }

    let mut removed = 0;
    if !request.keys.is_empty() {
        removed += state.cache.delete(&request.keys).await.map_err(cache_unavailable)?;
    }
    if let Some(ns) = &namespace {
        removed += state
            .cache
            .invalidate_namespace(ns)
            .await
            .map_err(cache_unavailable)?;
    }

    info!(namespace = ?namespace, keys = request.keys.len(), removed, "Cache invalidated");
    Ok(Json(InvalidateResponse {
        cache_enabled: true,
        namespace,
        removed,
    }))
}

fn cache_unavailable(e: CacheError) -> ApiError {
    ApiError::Unavailable(format!("cache backend: {}", e))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub composition_id: String,
    pub quantity: Option<u32>,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let Some(provider) = state.checkout.clone() else {
        return Err(ApiError::Unavailable("checkout is not configured".to_string()));
    };

    let quantity = body.quantity.unwrap_or(1);
    if quantity == 0 || quantity > MAX_QUANTITY {
        return Err(ApiError::BadRequest(format!(
            "quantity must be between 1 and {}",
            MAX_QUANTITY
        )));
    }

    let composition = load_composition(&state, &body.composition_id).await?;
    let request = CheckoutRequest::for_composition(&composition, quantity).ok_or_else(|| {
        ApiError::BadRequest(format!("composition {} is not for sale", composition.id))
    })?;

    let session = provider.create_session(&request).await?;
    Ok(Json(session))
}
