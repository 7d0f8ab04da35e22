//! Upload ingestion
//!
//! An upload becomes exactly two artifacts: a copy of the raw file under the
//! upload directory and a SQLite store under the database directory. Either
//! both exist afterwards, or neither does.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::StorageLayout;
use crate::naming::sanitize;
use crate::reader::{Reader, SqliteReader};
use crate::session::{SessionId, SessionRegistry};
use crate::source::{self, Sheet, SourceFormat};
use crate::{Result, SheetSqlError};

/// Outcome of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub session_id: SessionId,
    /// Table names in write order; a name repeats when two sheets collide
    pub tables: Vec<String>,
}

/// Writes uploads into per-session stores
pub struct Ingestor {
    layout: StorageLayout,
    registry: Arc<dyn SessionRegistry>,
}

impl Ingestor {
    pub fn new(layout: StorageLayout, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { layout, registry }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Path of the raw upload copy for a session
    pub fn upload_path(&self, session_id: &SessionId, filename: &str) -> PathBuf {
        self.layout
            .upload_dir
            .join(format!("{}_{}", session_id, base_name(filename)))
    }

    /// Ingest one uploaded file into the store of `session_id`.
    ///
    /// # Errors
    ///
    /// - `SheetSqlError::MissingFile` if `filename` is blank
    /// - `SheetSqlError::UnsupportedFormat` if the extension is not recognized
    /// - `SheetSqlError::IngestionFailure` if parsing or writing fails; no
    ///   artifact for the session is left behind in that case
    pub fn ingest(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: &[u8],
    ) -> Result<IngestReport> {
        if base_name(filename).is_empty() {
            return Err(SheetSqlError::MissingFile("Upload has no filename".to_string()));
        }

        let format = SourceFormat::from_filename(filename).ok_or_else(|| {
            SheetSqlError::UnsupportedFormat(format!(
                "Only CSV and Excel files are supported, got '{}'",
                filename
            ))
        })?;

        let upload_path = self.upload_path(session_id, filename);
        let store_path = self.registry.store_path(session_id);

        match self.write_artifacts(format, filename, bytes, &upload_path, &store_path) {
            Ok(tables) => {
                info!(
                    "Session {} created with {} table(s): {}",
                    session_id,
                    tables.len(),
                    tables.join(", ")
                );
                Ok(IngestReport {
                    session_id: session_id.clone(),
                    tables,
                })
            }
            Err(e) => {
                remove_artifacts(&[
                    upload_path,
                    store_path.clone(),
                    journal_path(&store_path),
                ]);
                Err(match e {
                    SheetSqlError::IngestionFailure(msg) => SheetSqlError::IngestionFailure(msg),
                    other => SheetSqlError::IngestionFailure(other.to_string()),
                })
            }
        }
    }

    fn write_artifacts(
        &self,
        format: SourceFormat,
        filename: &str,
        bytes: &[u8],
        upload_path: &Path,
        store_path: &Path,
    ) -> Result<Vec<String>> {
        std::fs::write(upload_path, bytes).map_err(|e| {
            SheetSqlError::IngestionFailure(format!(
                "Failed to save upload {}: {}",
                upload_path.display(),
                e
            ))
        })?;

        let sheets = source::read_sheets(format, upload_path, file_stem(filename))?;

        let mut store = SqliteReader::open_read_write(store_path)?;
        write_sheets(&mut store, sheets)
    }
}

/// Write sheets into the store under sanitized names, replacing on collision
pub fn write_sheets(store: &mut SqliteReader, sheets: Vec<Sheet>) -> Result<Vec<String>> {
    let mut tables = Vec::with_capacity(sheets.len());
    for sheet in sheets {
        let table = sanitize(&sheet.name);
        if tables.contains(&table) {
            warn!(
                "Sheet '{}' maps to existing table '{}' and replaces it",
                sheet.name, table
            );
        }
        info!(
            "Writing sheet '{}' as table '{}' ({} rows)",
            sheet.name,
            table,
            sheet.frame.height()
        );
        store.register(&table, sheet.frame)?;
        tables.push(table);
    }
    Ok(tables)
}

/// Last path component of a client-supplied filename
fn base_name(filename: &str) -> &str {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
}

/// Filename without directory and extension
fn file_stem(filename: &str) -> &str {
    let base = base_name(filename);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

fn journal_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push("-journal");
    PathBuf::from(name)
}

fn remove_artifacts(paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => info!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
