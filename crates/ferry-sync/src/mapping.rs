use std::collections::HashSet;
use std::sync::Arc;

use ferry_core::FieldMapping;

use crate::error::{Result, SyncError};

/// Target column names for a source column list: mapped columns are renamed,
/// unmapped ones keep their source name. Order is preserved.
///
/// Fails when two source columns land on the same target name, e.g. `a → b`
/// on a source that also has a `b`.
pub fn map_columns(columns: &[String], mapping: &FieldMapping) -> Result<Arc<[String]>> {
    let mapped: Arc<[String]> = columns
        .iter()
        .map(|c| mapping.get(c).cloned().unwrap_or_else(|| c.clone()))
        .collect();
    let mut seen = HashSet::with_capacity(mapped.len());
    if let Some(column) = mapped.iter().find(|&c| !seen.insert(c.as_str())) {
        return Err(SyncError::DuplicateTargetColumn {
            column: column.clone(),
        });
    }
    Ok(mapped)
}

/// The target-side name of a single source column.
pub fn target_column<'a>(column: &'a str, mapping: &'a FieldMapping) -> &'a str {
    mapping.get(column).map(String::as_str).unwrap_or(column)
}
