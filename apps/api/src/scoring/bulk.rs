//! Bulk scoring: every recognized resume inside a zip archive is scored independently.
//!
//! A failing entry becomes an `ERROR` row with a zero score; the batch always runs to
//! the end.

use std::io::{Cursor, Read};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::scoring::extract::{MediaType, ResumeDocument};
use crate::scoring::pipeline::{ScoreRequest, ScoringPipeline};

pub const ERROR_STATUS: &str = "ERROR";

#[derive(Debug, Error)]
pub enum BulkError {
    #[error("Could not read zip archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Archive contains no .pdf or .txt resumes.")]
    Empty,
}

/// Decompression budget for one archive.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    pub max_member_bytes: usize,
    pub max_total_bytes: usize,
}

impl ArchiveLimits {
    /// Members may be as large as a single upload; the archive as a whole four times that.
    pub fn for_upload(max_upload_bytes: usize) -> Self {
        Self {
            max_member_bytes: max_upload_bytes,
            max_total_bytes: max_upload_bytes.saturating_mul(4),
        }
    }
}

/// One archive member with a recognized extension.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub file_name: String,
    pub candidate: String,
    /// The document, or why its bytes could not be read out of the archive.
    pub contents: Result<ResumeDocument, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkRow {
    pub candidate: String,
    pub status: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkReport {
    pub results: Vec<BulkRow>,
    pub processed: usize,
    pub failed: usize,
}

/// Lists the `.pdf` / `.txt` members of a zip archive in archive order.
/// Directories and macOS resource forks are skipped. Decompressed sizes are counted as
/// bytes come out, not taken from the member headers; a member that would cross a limit
/// is kept as an unreadable entry.
pub fn read_archive(bytes: &[u8], limits: ArchiveLimits) -> Result<Vec<ArchiveEntry>, BulkError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::new();
    let mut total = 0usize;

    for i in 0..archive.len() {
        let mut file = match archive.by_index(i) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping unreadable archive member #{i}: {e}");
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }
        let file_name = file.name().to_string();
        if file_name.starts_with("__MACOSX/") || MediaType::recognized(&file_name).is_none() {
            continue;
        }

        let budget = limits
            .max_member_bytes
            .min(limits.max_total_bytes.saturating_sub(total));
        let contents = match read_member(&mut file, budget) {
            Ok(Some(buf)) => {
                total += buf.len();
                Ok(ResumeDocument::new(buf, Some(file_name.clone())))
            }
            Ok(None) => {
                warn!("Archive member '{file_name}' exceeds {budget} bytes");
                Err(format!("'{file_name}' exceeds the {budget} byte decompression limit"))
            }
            Err(e) => Err(format!("Could not read '{file_name}' from archive: {e}")),
        };
        entries.push(ArchiveEntry {
            candidate: candidate_name(&file_name),
            file_name,
            contents,
        });
    }

    if entries.is_empty() {
        return Err(BulkError::Empty);
    }
    Ok(entries)
}

/// Reads at most `budget` bytes; `None` when the member holds more.
fn read_member(reader: &mut impl Read, budget: usize) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    reader.take(budget as u64 + 1).read_to_end(&mut buf)?;
    if buf.len() > budget {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// File name without directories or extension.
fn candidate_name(file_name: &str) -> String {
    let base = file_name.rsplit('/').next().unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Scores entries one after another and aggregates one row per entry.
pub async fn score_archive(pipeline: &ScoringPipeline, entries: Vec<ArchiveEntry>) -> BulkReport {
    let mut results = Vec::with_capacity(entries.len());

    for entry in entries {
        let row = match entry.contents {
            Ok(document) => {
                let request = ScoreRequest {
                    document,
                    name: entry.candidate.clone(),
                    candidate_email: None,
                };
                match pipeline.score(request).await {
                    Ok(response) => BulkRow {
                        candidate: entry.candidate,
                        status: response.decision.to_string(),
                        score: response.probability,
                        external_record_id: response.external_record_id,
                        error: None,
                    },
                    Err(e) => error_row(entry.candidate, e.to_string()),
                }
            }
            Err(message) => error_row(entry.candidate, message),
        };
        if row.error.is_some() {
            warn!("Bulk entry '{}' failed", entry.file_name);
        }
        results.push(row);
    }

    let failed = results.iter().filter(|r| r.status == ERROR_STATUS).count();
    info!(
        "Bulk scoring finished: {} processed, {failed} failed",
        results.len()
    );
    BulkReport {
        processed: results.len(),
        failed,
        results,
    }
}

fn error_row(candidate: String, message: String) -> BulkRow {
    BulkRow {
        candidate,
        status: ERROR_STATUS.to_string(),
        score: 0.0,
        external_record_id: None,
        error: Some(message),
    }
}

#[cfg(test)]
pub(crate) fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(contents).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::extract::minimal_pdf;
    use crate::test_support::{
        pipeline_with, FixedClassifier, MemoryRecordStore, MemoryReportSink,
    };
    use std::sync::Arc;

    const LIMITS: ArchiveLimits = ArchiveLimits {
        max_member_bytes: 1024,
        max_total_bytes: 4096,
    };

    #[test]
    fn test_read_archive_filters_and_names_entries() {
        let zip = build_zip(&[
            ("alice.pdf", &b"%PDF"[..]),
            ("notes.md", &b"# ignore"[..]),
            ("team/bob.TXT", &b"Python"[..]),
            ("__MACOSX/._alice.pdf", &b"junk"[..]),
        ]);
        let entries = read_archive(&zip, LIMITS).unwrap();
        let names: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.file_name.as_str(), e.candidate.as_str()))
            .collect();
        assert_eq!(names, vec![("alice.pdf", "alice"), ("team/bob.TXT", "bob")]);
    }

    #[test]
    fn test_archive_without_resumes_is_empty_error() {
        let zip = build_zip(&[("readme.md", &b"nothing here"[..])]);
        assert!(matches!(read_archive(&zip, LIMITS), Err(BulkError::Empty)));
    }

    #[test]
    fn test_garbage_is_archive_error() {
        assert!(matches!(
            read_archive(b"definitely not a zip", LIMITS),
            Err(BulkError::Archive(_))
        ));
    }

    #[test]
    fn test_oversized_member_is_error_entry() {
        let at_limit = vec![b'a'; 1024];
        let over_limit = vec![b'a'; 1025];
        let zip = build_zip(&[
            ("fits.txt", at_limit.as_slice()),
            ("bomb.txt", over_limit.as_slice()),
        ]);
        let entries = read_archive(&zip, LIMITS).unwrap();
        assert_eq!(entries[0].contents.as_ref().unwrap().bytes.len(), 1024);
        let err = entries[1].contents.as_ref().unwrap_err();
        assert!(err.contains("1024 byte decompression limit"), "{err}");
    }

    #[test]
    fn test_total_budget_stops_reading_members() {
        let body = vec![b'z'; 1000];
        let names = ["a.txt", "b.txt", "c.txt", "d.txt", "e.txt"];
        let files: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, body.as_slice())).collect();
        let entries = read_archive(&build_zip(&files), LIMITS).unwrap();
        assert_eq!(entries.len(), 5);
        assert!(entries[..4].iter().all(|e| e.contents.is_ok()));
        let err = entries[4].contents.as_ref().unwrap_err();
        assert!(err.contains("96 byte decompression limit"), "{err}");
    }

    #[test]
    fn test_upload_limits_scale_total() {
        let limits = ArchiveLimits::for_upload(10);
        assert_eq!(limits.max_member_bytes, 10);
        assert_eq!(limits.max_total_bytes, 40);
    }

    #[test]
    fn test_candidate_name_strips_last_extension_only() {
        assert_eq!(candidate_name("dir/jane.doe.pdf"), "jane.doe");
        assert_eq!(candidate_name(".txt"), ".txt");
    }

    #[tokio::test]
    async fn test_corrupted_entry_does_not_abort_batch() {
        let pdf = minimal_pdf(&["Python developer with AWS and SQL"]);
        let zip = build_zip(&[
            ("ada.pdf", pdf.as_slice()),
            ("grace.txt", &b"Machine learning and data engineering"[..]),
            ("broken.pdf", &b"%PDF-1.4 this is not a real pdf"[..]),
        ]);
        let records = Arc::new(MemoryRecordStore::accepting("a01BULK"));
        let pipeline = pipeline_with(
            Arc::new(FixedClassifier::new(0.8)),
            records.clone(),
            Arc::new(MemoryReportSink::default()),
        );

        let report = score_archive(&pipeline, read_archive(&zip, LIMITS).unwrap()).await;

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 1);
        let rows = &report.results;
        assert_eq!(rows[0].candidate, "ada");
        assert_eq!(rows[0].status, "Hire");
        assert_eq!(rows[0].score, 0.8);
        assert_eq!(rows[1].candidate, "grace");
        assert_eq!(rows[1].status, "Hire");
        assert_eq!(rows[2].candidate, "broken");
        assert_eq!(rows[2].status, ERROR_STATUS);
        assert_eq!(rows[2].score, 0.0);
        assert!(rows[2].error.is_some());
        assert_eq!(records.records().len(), 2);
    }
}
