//! Out-of-band result staging.
//!
//! Query rows never travel back through the tool response. They are written
//! to `<dir>/<ordering-key>_<label>_<tool>.json`, where the ordering key
//! is `<unix millis, 13 digits>-<per-process sequence, 6 digits>` and the
//! tool is `execute_sql` or `search_objects`. Keys sort lexicographically in
//! creation order, so the newest file for a label is the greatest name.

use crate::config::{EXECUTE_SQL_TOOL, SEARCH_OBJECTS_TOOL};
use crate::db::{ColumnInfo, Row};
use crate::error::{GatewayError, Result};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Default staging directory, relative to the working directory.
pub const STAGING_DIR_NAME: &str = ".safe-sql-results";

/// Suffix of files staged by `execute_sql`.
pub const STAGED_FILE_SUFFIX: &str = "_execute_sql.json";

/// Tools that stage results.
const STAGING_TOOLS: &[&str] = &[EXECUTE_SQL_TOOL, SEARCH_OBJECTS_TOOL];

/// A result file written to the staging area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedResult {
    /// Full path of the staged file.
    pub path: PathBuf,
    /// Number of rows written.
    pub row_count: usize,
}

/// Writes result sets to uniquely named files.
#[derive(Debug)]
pub struct ResultStager {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl ResultStager {
    /// Creates a stager writing into `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the default staging directory.
    pub fn default_dir() -> PathBuf {
        PathBuf::from(STAGING_DIR_NAME)
    }

    /// Directory files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stages `execute_sql` rows for `label`. Files are never overwritten.
    pub async fn stage(
        &self,
        label: &str,
        columns: &[ColumnInfo],
        rows: &[Row],
    ) -> Result<StagedResult> {
        self.stage_for(EXECUTE_SQL_TOOL, label, columns, rows).await
    }

    /// Stages rows produced by `tool` for `label`.
    ///
    /// A file that cannot be written completely is removed again, so a
    /// reader never picks up a truncated document.
    pub async fn stage_for(
        &self,
        tool: &str,
        label: &str,
        columns: &[ColumnInfo],
        rows: &[Row],
    ) -> Result<StagedResult> {
        if !STAGING_TOOLS.contains(&tool) {
            return Err(GatewayError::staging(format!("No staging for tool '{tool}'")));
        }
        let body = serde_json::to_vec(&RowsDocument { columns, rows })?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            GatewayError::staging(format!(
                "Failed to create staging directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let path = self.dir.join(self.file_name(tool, label));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                GatewayError::staging(format!("Failed to create {}: {e}", path.display()))
            })?;

        write_or_remove(&path, file, &body).await?;

        debug!("Staged {} rows to {}", rows.len(), path.display());
        Ok(StagedResult {
            path,
            row_count: rows.len(),
        })
    }

    /// Returns the most recent `execute_sql` file for `label`, if any.
    pub async fn latest_for(&self, label: &str) -> Result<Option<PathBuf>> {
        self.latest_for_tool(EXECUTE_SQL_TOOL, label).await
    }

    /// Returns the most recent file staged by `tool` for `label`, if any.
    pub async fn latest_for_tool(&self, tool: &str, label: &str) -> Result<Option<PathBuf>> {
        let label = sanitize_label(label);
        let suffix = file_suffix(tool);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<String> = None;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if parse_label(&name, &suffix) != Some(label.as_str()) {
                continue;
            }
            if latest.as_deref().map_or(true, |current| name.as_str() > current) {
                latest = Some(name);
            }
        }

        Ok(latest.map(|name| self.dir.join(name)))
    }

    fn file_name(&self, tool: &str, label: &str) -> String {
        format!(
            "{}_{}{}",
            self.next_key(),
            sanitize_label(label),
            file_suffix(tool)
        )
    }

    fn next_key(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        format!("{millis:013}-{seq:06}")
    }
}

/// Writes `body` to a freshly created `file`, removing `path` on failure.
async fn write_or_remove(path: &Path, mut file: tokio::fs::File, body: &[u8]) -> Result<()> {
    let written = match file.write_all(body).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = written {
        if let Err(remove_error) = tokio::fs::remove_file(path).await {
            warn!(
                "Failed to remove partial staged file {}: {}",
                path.display(),
                remove_error
            );
        }
        return Err(GatewayError::staging(format!(
            "Failed to write {}: {e}",
            path.display()
        )));
    }
    Ok(())
}

fn file_suffix(tool: &str) -> String {
    format!("_{tool}.json")
}

/// Encodes a label as `[A-Za-z0-9-]` plus `%XX` escapes, one per UTF-8 byte
/// of every other character.
///
/// The encoding is injective, so distinct labels never share files, and the
/// result cannot contain path separators, dots or the `_` field separator.
pub fn sanitize_label(label: &str) -> String {
    if label.is_empty() {
        return "default".to_string();
    }

    let mut encoded = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            encoded.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// Extracts the encoded label from a staged file name.
fn parse_label<'a>(file_name: &'a str, suffix: &str) -> Option<&'a str> {
    let stem = file_name.strip_suffix(suffix)?;
    let (_key, label) = stem.split_once('_')?;
    Some(label)
}

/// Serializes rows as a JSON array of objects in column order.
struct RowsDocument<'a> {
    columns: &'a [ColumnInfo],
    rows: &'a [Row],
}

impl Serialize for RowsDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in self.rows {
            seq.serialize_element(&RowObject {
                columns: self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

struct RowObject<'a> {
    columns: &'a [ColumnInfo],
    row: &'a Row,
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.row.iter()) {
            map.serialize_entry(&column.name, &value.to_json())?;
        }
        map.end()
    }
}
