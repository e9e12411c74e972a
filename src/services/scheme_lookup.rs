// src/services/scheme_lookup.rs
use log::{info, warn};

use crate::models::{FundMatch, FundRecord};
use crate::services::error::{Result, ServiceError};
use crate::services::fuzzy::{normalize, weighted_ratio_normalized};
use crate::services::mfapi::FundDataSource;

/// Index and score of the highest-scoring catalog name; the first one wins ties.
pub fn best_match(catalog: &[FundRecord], query: &str) -> Option<(usize, f64)> {
    let query = normalize(query);
    if query.is_empty() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (i, record) in catalog.iter().enumerate() {
        let score = weighted_ratio_normalized(&query, &normalize(&record.scheme_name));
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((i, score));
            if score >= 100.0 {
                break;
            }
        }
    }
    best
}

/// Resolves a free-text fund name against the provider catalog.
///
/// The whole catalog is fetched on every call. Matches scoring below
/// `min_score` are rejected rather than returned as a guess.
pub async fn find_scheme_by_name(source: &dyn FundDataSource, name: &str, min_score: f64) -> Result<FundMatch> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::invalid("scheme_name must not be empty"));
    }

    let catalog = source.fetch_catalog().await.map_err(|e| match e {
        ServiceError::UpstreamTimeout(_) => e,
        other => ServiceError::ResolutionFailure(format!("fund catalog unreachable ({})", other)),
    })?;

    if catalog.is_empty() {
        return Err(ServiceError::ResolutionFailure("fund catalog is empty".to_string()));
    }

    // Scoring tens of thousands of names is CPU work; keep it off the async workers.
    let query = name.to_string();
    let best = tokio::task::spawn_blocking(move || {
        best_match(&catalog, &query).map(|(i, score)| (catalog[i].clone(), score))
    })
    .await
    .map_err(|e| ServiceError::ResolutionFailure(format!("matcher task failed: {}", e)))?;

    let (record, score) = best.ok_or_else(|| {
        ServiceError::ResolutionFailure(format!("no fund name could be matched to '{}'", name))
    })?;

    if score < min_score {
        warn!(
            "Best match for '{}' is '{}' at {:.1}, below the {:.1} threshold",
            name, record.scheme_name, score, min_score
        );
        return Err(ServiceError::ResolutionFailure(format!(
            "no fund closely matches '{}' (best candidate '{}' scored {:.1})",
            name, record.scheme_name, score
        )));
    }

    info!("Resolved '{}' to {} '{}' (score {:.1})", name, record.scheme_code, record.scheme_name, score);
    Ok(FundMatch {
        scheme_code: record.scheme_code,
        scheme_name: record.scheme_name,
        score,
    })
}
