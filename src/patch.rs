use json_patch::Patch;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("serialize mutated object failed, {0}")]
    Serialize(#[from] serde_json::Error),
}

/// RFC 6902 operations which turn `original` into `mutated`, `None` if
/// they are equal.
///
/// Applying the result to `original` must give exactly the serialized form
/// of `mutated`, so callers pass the original in the same normalized form.
pub fn diff<T: Serialize>(original: &Value, mutated: &T) -> Result<Option<Patch>, PatchError> {
    let mutated = serde_json::to_value(mutated)?;

    let patch = json_patch::diff(original, &mutated);
    if patch.0.is_empty() {
        return Ok(None);
    }

    Ok(Some(patch))
}
