//! Column decoding helpers shared by the repositories.

use rusqlite::types::FromSql;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use brainbox_core::error::{BrainboxError, Result};
use brainbox_core::types::Timestamp;

/// Map a rusqlite error into a storage error with some context.
pub(crate) fn sql_err(context: &'static str) -> impl Fn(rusqlite::Error) -> BrainboxError {
    move |e| BrainboxError::Storage(format!("{}: {}", context, e))
}

pub(crate) fn get<T: FromSql>(row: &Row<'_>, idx: usize) -> Result<T> {
    row.get(idx)
        .map_err(|e| BrainboxError::Storage(format!("Column {}: {}", idx, e)))
}

pub(crate) fn uuid(row: &Row<'_>, idx: usize) -> Result<Uuid> {
    let raw: String = get(row, idx)?;
    parse_uuid(&raw)
}

pub(crate) fn opt_uuid(row: &Row<'_>, idx: usize) -> Result<Option<Uuid>> {
    let raw: Option<String> = get(row, idx)?;
    raw.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| BrainboxError::Storage(format!("Invalid UUID: {}", e)))
}

pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> Result<Timestamp> {
    Ok(Timestamp(get(row, idx)?))
}

pub(crate) fn opt_timestamp(row: &Row<'_>, idx: usize) -> Result<Option<Timestamp>> {
    let raw: Option<i64> = get(row, idx)?;
    Ok(raw.map(Timestamp))
}

pub(crate) fn json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<T> {
    let raw: String = get(row, idx)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn opt_json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<Option<T>> {
    let raw: Option<String> = get(row, idx)?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Decode a column holding a `Display`/`FromStr` enum.
pub(crate) fn parsed<T>(row: &Row<'_>, idx: usize) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = get(row, idx)?;
    raw.parse().map_err(BrainboxError::Storage)
}

/// Collect a `query_map` over rows decoded with one of the helpers above.
pub(crate) fn collect<T>(
    rows: impl Iterator<Item = rusqlite::Result<Result<T>>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(|e| BrainboxError::Storage(e.to_string()))??);
    }
    Ok(out)
}
