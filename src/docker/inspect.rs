//! Decoding of `docker inspect` style output
//!
//! Docker reports a missing entity as plain text ("Error: No such object: x")
//! next to an empty JSON array, not as a structured error. Output that contains
//! one of the known phrases decodes to `Ok(None)`. Everything else, including
//! empty output, must be valid JSON; a parse failure is a [`DecodeError`]
//! carrying the raw text so the unexpected message can be diagnosed.

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Length of the short form of a container or task id
pub const SHORT_ID_LEN: usize = 12;

/// Phrases docker prints instead of JSON when the inspected entity is missing
pub const NOT_FOUND_SENTINELS: &[&str] = &[
    "No such object",
    "no such service",
    "no such task",
    "No such container",
];

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON in inspect output ({source}):\n{raw}")]
    Json {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn from_json(source: serde_json::Error, raw: &str) -> Self {
        DecodeError::Json {
            raw: raw.to_string(),
            source,
        }
    }

    /// The text that failed to decode
    pub fn raw(&self) -> &str {
        match self {
            DecodeError::Json { raw, .. } => raw,
        }
    }
}

/// A record decoded from inspect output
pub trait InspectRecord: DeserializeOwned {
    /// Post-processing applied after every successful decode
    fn normalize(&mut self) {}
}

/// Truncate an id to [`SHORT_ID_LEN`] characters; shorter ids are returned unchanged
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// True when `raw` is docker's way of saying the entity does not exist
pub fn is_not_found(raw: &str, sentinels: &[&str]) -> bool {
    sentinels.iter().any(|sentinel| raw.contains(sentinel))
}

/// Decode inspect output holding a JSON array or a single object.
///
/// Every decoded record is normalized. A sentinel hit is `Ok(None)`; an empty
/// array is `Ok(Some(vec![]))`.
pub fn decode_inspect<T: InspectRecord>(
    raw: &str,
    sentinels: &[&str],
) -> Result<Option<Vec<T>>, DecodeError> {
    if is_not_found(raw, sentinels) {
        tracing::debug!("Inspect output reports a missing entity");
        return Ok(None);
    }

    let decoded: OneOrMany<T> =
        serde_json::from_str(raw).map_err(|e| DecodeError::from_json(e, raw))?;

    let mut records = match decoded {
        OneOrMany::Many(records) => records,
        OneOrMany::One(record) => vec![record],
    };
    records.iter_mut().for_each(InspectRecord::normalize);
    Ok(Some(records))
}

/// Decode inspect output and keep its first record; an empty array is absent
pub fn first_record<T: InspectRecord>(
    raw: &str,
    sentinels: &[&str],
) -> Result<Option<T>, DecodeError> {
    Ok(decode_inspect(raw, sentinels)?.and_then(|records| records.into_iter().next()))
}
