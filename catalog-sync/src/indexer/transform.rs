//! Row to document transformation.

use catalog_core::{
    CatalogResult, ChangedRow, IndexDocument, RatingBlock, ReviewStatus, ValidationError,
};
use serde_json::Value;

const NAME_ATTRIBUTE: &str = "name";
const MIN_RATING: i32 = 1;
const MAX_RATING: i32 = 5;
const MIN_SUGGESTION_LEN: usize = 2;

/// Build the full search document for one changed row.
///
/// Deterministic: the same row always yields the same document, which is
/// what makes overlapping indexer runs safe.
pub fn transform_row(row: &ChangedRow) -> CatalogResult<IndexDocument> {
    let rating = aggregate_rating(row)?;
    let suggestions = match row.attributes.get(NAME_ATTRIBUTE) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => suggestions_for(name),
        Some(_) => {
            return Err(ValidationError::InvalidValue {
                field: NAME_ATTRIBUTE.to_string(),
                reason: format!("entity {} has a non-string name", row.entity_id),
            }
            .into())
        }
    };

    Ok(IndexDocument {
        entity_id: row.entity_id,
        last_modified: row.last_modified,
        attributes: row.attributes.clone(),
        statistics: row.statistics.unwrap_or_default(),
        rating,
        suggestions,
    })
}

/// Average and count over active reviews, average rounded to two places.
fn aggregate_rating(row: &ChangedRow) -> CatalogResult<RatingBlock> {
    let mut sum: i64 = 0;
    let mut count: u64 = 0;

    for review in row
        .reviews
        .iter()
        .filter(|r| r.status == ReviewStatus::Active)
    {
        if !(MIN_RATING..=MAX_RATING).contains(&review.rating) {
            return Err(ValidationError::InvalidValue {
                field: "rating".to_string(),
                reason: format!(
                    "entity {} has review rating {} outside {MIN_RATING}..={MAX_RATING}",
                    row.entity_id, review.rating
                ),
            }
            .into());
        }
        sum += i64::from(review.rating);
        count += 1;
    }

    if count == 0 {
        return Ok(RatingBlock::default());
    }
    let average = (sum as f64 / count as f64 * 100.0).round() / 100.0;
    Ok(RatingBlock { average, count })
}

/// Autocomplete terms: the whole trimmed name, then its distinct lowercase
/// words in order of appearance.
pub fn suggestions_for(name: &str) -> Vec<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut out = vec![trimmed.to_string()];
    for word in trimmed
        .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | '.'))
        .map(str::to_lowercase)
    {
        if word.chars().count() < MIN_SUGGESTION_LEN
            || word.chars().all(|c| c.is_ascii_digit())
            || out.contains(&word)
        {
            continue;
        }
        out.push(word);
    }
    out
}
