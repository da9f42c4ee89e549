use std::fmt::Write as _;

use reqwest::Method;
use serde_json::Value;

use crate::core::client::constants::CACHE_NAMESPACE;
use crate::core::config::StorageKind;
use crate::core::error::FetchError;

/// Derive the cache key for a request.
///
/// The raw key is `METHOD url body`, with the body rendered as JSON with object keys
/// sorted so equal values always produce equal keys. Persistent backends get the raw
/// key folded through [`rolling_hash`] and prefixed with a namespace tag instead.
///
/// The persistent form is only 32 bits wide. Two different requests can collide and
/// serve each other's cached payload; callers that cannot tolerate that should keep
/// to in-memory storage, whose keys are the full raw string.
///
/// # Errors
/// Returns `ESERIALIZE` if the body cannot be rendered.
pub fn derive_key(
    method: &Method,
    url: &str,
    body: Option<&Value>,
    storage: StorageKind,
) -> Result<String, FetchError> {
    let mut raw = format!("{method} {url} ");
    if let Some(body) = body {
        write_canonical(body, &mut raw)?;
    }
    Ok(match storage {
        StorageKind::Memory => raw,
        StorageKind::Persistent => format!("{CACHE_NAMESPACE}{:08x}", rolling_hash(&raw)),
    })
}

/// 32-bit polynomial rolling hash (`h = h * 31 + byte`, wrapping). Stable across runs
/// and platforms.
pub fn rolling_hash(input: &str) -> u32 {
    input
        .bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), FetchError> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).map_err(FetchError::serialize)?);
                out.push(':');
                write_canonical(v, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out)?;
            }
            out.push(']');
        }
        scalar => {
            write!(out, "{scalar}").map_err(FetchError::serialize)?;
        }
    }
    Ok(())
}
