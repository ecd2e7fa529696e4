//! Turning a retrieved payload into a flat list of entities.

use crate::error::AppError;
use crate::models::is_present;
use crate::paginate::PagedResult;

/// Follow a dotted path (`"data.items"`) into `value`.
///
/// Array elements can be addressed by index (`"results.0.items"`).
pub fn object_ref<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Result<&'a serde_json::Value, AppError> {
    let mut current = value;
    for segment in path.split('.') {
        let next = match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            _ => None,
        };
        current = next.ok_or_else(|| {
            AppError::EntityLevel(format!(
                "entity level '{path}' not found in payload (missing '{segment}')"
            ))
        })?;
    }
    Ok(current)
}

/// Normalize a retrieved result into entities.
///
/// With an entity level, a paginated result resolves the level on every page
/// and concatenates the results, while a single page resolves it once on the
/// whole payload. A single non-array result becomes a one-element list; an
/// absent payload yields no entities.
pub fn normalize_entities(
    result: PagedResult,
    entity_level: Option<&str>,
) -> Result<Vec<serde_json::Value>, AppError> {
    match result {
        PagedResult::Empty => Ok(Vec::new()),
        PagedResult::Paged(pages) => {
            let Some(level) = entity_level else {
                return Ok(pages);
            };
            let mut entities = Vec::new();
            for page in &pages {
                match object_ref(page, level)? {
                    serde_json::Value::Array(items) => entities.extend(items.iter().cloned()),
                    other => entities.push(other.clone()),
                }
            }
            Ok(entities)
        }
        PagedResult::Single(payload) if !is_present(&payload) => Ok(Vec::new()),
        PagedResult::Single(payload) => {
            let resolved = match entity_level {
                Some(level) => object_ref(&payload, level)?.clone(),
                None => payload,
            };
            Ok(spread(resolved))
        }
    }
}

fn spread(value: serde_json::Value) -> Vec<serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items,
        other if is_present(&other) => vec![other],
        _ => Vec::new(),
    }
}
