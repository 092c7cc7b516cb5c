//! Business functions behind the two API methods.

use crate::requests::OnlineScoreRequest;
use crate::store::{ResilientStore, StoreError};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

/// How long a computed score stays cached.
pub const SCORE_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Interests recorded for a client under `i:<cid>`; empty when none are stored.
///
/// Uses the retrying read, so an unreachable store surfaces as an error.
pub async fn get_interests(store: &ResilientStore, cid: i64) -> Result<Value, StoreError> {
    let key = format!("i:{}", cid);
    let interests = match store.get(&key).await? {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key = %key, "Stored interests are not valid JSON: {}", e);
            Value::Array(Vec::new())
        }),
        None => Value::Array(Vec::new()),
    };
    Ok(interests)
}

/// Scores a validated request, consulting the degraded cache first.
///
/// Never fails: an unreachable store only means the score is recomputed and
/// not cached.
pub async fn get_score(store: &ResilientStore, request: &OnlineScoreRequest) -> f64 {
    let key = score_cache_key(request);

    if let Some(cached) = store.get_cache(&key).await.and_then(|raw| raw.parse::<f64>().ok()) {
        if cached > 0.0 {
            return cached;
        }
    }

    let score = compute_score(request);
    if !store
        .set_cache(&key, &score.to_string(), Some(SCORE_CACHE_TTL))
        .await
    {
        tracing::debug!(key = %key, "Score not cached");
    }
    score
}

fn compute_score(request: &OnlineScoreRequest) -> f64 {
    let mut score = 0.0;
    if request.phone.is_some() {
        score += 1.5;
    }
    if request.email.is_some() {
        score += 1.5;
    }
    if request.birthday.is_some() && request.gender.is_some() {
        score += 1.5;
    }
    if request.first_name.is_some() && request.last_name.is_some() {
        score += 0.5;
    }
    score
}

/// Every field that affects the score is part of the key.
fn score_cache_key(request: &OnlineScoreRequest) -> String {
    let birthday = request
        .birthday
        .map(|date| date.format("%Y%m%d").to_string())
        .unwrap_or_default();
    let gender = request.gender.map(|g| g.to_string()).unwrap_or_default();
    let parts = [
        request.first_name.as_deref().unwrap_or_default(),
        request.last_name.as_deref().unwrap_or_default(),
        request.email.as_deref().unwrap_or_default(),
        request.phone.as_deref().unwrap_or_default(),
        birthday.as_str(),
        gender.as_str(),
    ];

    let mut hasher = Sha256::new();
    hasher.update(parts.join("\u{1f}").as_bytes());
    format!("uid:{}", hex::encode(hasher.finalize()))
}
