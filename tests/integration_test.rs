//! Integration Tests for sheetlm
//!
//! End-to-end tests of the conversion coordinator: batching, fallback,
//! truncation, and directory processing. The generation backend is replaced
//! with scripted mocks so no network access happens.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sheetlm::{
    ConversionMode, ConverterBuilder, GenerationBackend, GenerationError,
};

// Helper module for generating test fixtures
mod fixtures {
    use rust_xlsxwriter::{Workbook, XlsxError};
    use std::path::Path;

    /// Generate a workbook with the given sheet names, one marker cell each
    pub fn workbook_with_sheets(path: &Path, sheet_names: &[&str]) -> Result<(), XlsxError> {
        let mut workbook = Workbook::new();

        for name in sheet_names {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(*name)?;
            worksheet.write_string(0, 0, &format!("{}_Header", name))?;
            worksheet.write_string(1, 0, &format!("{}_Data", name))?;
        }

        workbook.save(path)?;
        Ok(())
    }

    /// Generate a CSV file with `rows` data rows of the form "r<idx>,<idx>"
    pub fn csv_with_rows(path: &Path, rows: usize) -> std::io::Result<()> {
        let mut content = String::from("label,value\n");
        for i in 0..rows {
            content.push_str(&format!("r{},{}\n", i, i));
        }
        std::fs::write(path, content)
    }
}

/// A scripted reply from the mock backend
enum Reply {
    Text(String),
    ApiError { status: u16, message: String },
}

/// Mock backend that replays scripted replies and records every payload
struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    payloads: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            payloads: Mutex::new(Vec::new()),
        })
    }

    fn payloads(&self) -> Vec<String> {
        self.payloads.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

/// Local newtype so the shared (`Arc`) mock can own the trait impl from this
/// crate — the orphan rule forbids `impl GenerationBackend for Arc<T>` here.
struct SharedBackend(Arc<ScriptedBackend>);

impl GenerationBackend for SharedBackend {
    fn generate(&self, payload: &str) -> Result<String, GenerationError> {
        self.0.payloads.lock().unwrap().push(payload.to_string());

        match self.0.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::ApiError { status, message }) => {
                Err(GenerationError::Api { status, message })
            }
            None => Err(GenerationError::EmptyResponse),
        }
    }
}

/// JSON reply containing one file per listed sheet name
fn files_reply(base: &str, sheets: &[&str]) -> Reply {
    let files: Vec<serde_json::Value> = sheets
        .iter()
        .map(|name| {
            serde_json::json!({
                "filename": format!("{}.md", name),
                "content": format!("# {}\n\nConverted content for {}.", name, base)
            })
        })
        .collect();
    Reply::Text(serde_json::json!({ "files": files }).to_string())
}

/// Build a converter around a mock backend with all delays zeroed
fn converter_with(backend: Arc<ScriptedBackend>) -> ConverterBuilder {
    ConverterBuilder::new()
        .with_backend(Box::new(SharedBackend(backend)))
        .with_batch_delay(Duration::ZERO)
        .with_sheet_delay(Duration::ZERO)
        .with_initial_retry_delay(Duration::ZERO)
}

// --- Batch planning end-to-end ---

#[test]
fn test_three_small_sheets_become_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    fixtures::workbook_with_sheets(&input, &["Alpha", "Beta", "Gamma"]).unwrap();

    let backend = ScriptedBackend::new(vec![files_reply(
        "report",
        &["Alpha", "Beta", "Gamma"],
    )]);
    let converter = converter_with(backend.clone()).build().unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));

    // One request, three output files, no errors
    assert_eq!(backend.call_count(), 1);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_files.len(), 3);

    let payload = &backend.payloads()[0];
    assert!(payload.contains("=== SHEET: Alpha ==="));
    assert!(payload.contains("=== SHEET: Beta ==="));
    assert!(payload.contains("=== SHEET: Gamma ==="));

    let names: Vec<String> = outcome
        .created_files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec!["report_Alpha.md", "report_Beta.md", "report_Gamma.md"]
    );
}

#[test]
fn test_max_batch_size_one_sends_three_requests() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    fixtures::workbook_with_sheets(&input, &["Alpha", "Beta", "Gamma"]).unwrap();

    let backend = ScriptedBackend::new(vec![
        files_reply("report", &["Alpha"]),
        files_reply("report", &["Beta"]),
        files_reply("report", &["Gamma"]),
    ]);
    let converter = converter_with(backend.clone())
        .with_max_batch_size(1)
        .build()
        .unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));

    assert_eq!(backend.call_count(), 3);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_files.len(), 3);

    // Each payload carries exactly one sheet marker
    // (the instruction template itself mentions the marker syntax once)
    for (payload, name) in backend.payloads().iter().zip(["Alpha", "Beta", "Gamma"]) {
        assert_eq!(payload.matches("=== SHEET:").count(), 2);
        assert!(payload.contains(&format!("=== SHEET: {} ===", name)));
    }
}

// --- Batch failure fallback ---

#[test]
fn test_batch_failure_falls_back_to_per_sheet_processing() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    fixtures::workbook_with_sheets(&input, &["Alpha", "Beta", "Gamma"]).unwrap();

    // Batch request fails; individual requests: ok, fail, ok
    let backend = ScriptedBackend::new(vec![
        Reply::ApiError {
            status: 500,
            message: "Internal error".to_string(),
        },
        files_reply("report", &["Alpha"]),
        Reply::ApiError {
            status: 429,
            message: "Quota exceeded for model".to_string(),
        },
        files_reply("report", &["Gamma"]),
    ]);
    let converter = converter_with(backend.clone())
        .with_max_retries(1)
        .build()
        .unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));

    // 1 batch call + 3 individual calls
    assert_eq!(backend.call_count(), 4);

    // Two sheets succeeded, one produced a per-sheet error entry
    assert_eq!(outcome.created_files.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].source, "report.xlsx - Beta");
    assert_eq!(
        outcome.errors[0].message,
        "Quota exceeded or requests were sent too quickly."
    );
}

// --- CSV handling ---

#[test]
fn test_csv_conversion_produces_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.csv");
    fixtures::csv_with_rows(&input, 5).unwrap();

    let backend = ScriptedBackend::new(vec![Reply::Text(
        serde_json::json!({
            "files": [{"filename": "data.md", "content": "# Data"}]
        })
        .to_string(),
    )]);
    let converter = converter_with(backend.clone()).build().unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));

    assert_eq!(backend.call_count(), 1);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_files.len(), 1);
    assert!(outcome.created_files[0].ends_with("data.md"));

    let payload = &backend.payloads()[0];
    assert!(payload.contains("CSV file 'data.csv':"));
}

#[test]
fn test_oversized_csv_truncated_before_prompting() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("big.csv");
    fixtures::csv_with_rows(&input, 6000).unwrap();

    let backend = ScriptedBackend::new(vec![Reply::Text(
        serde_json::json!({
            "files": [{"filename": "big.md", "content": "# Big"}]
        })
        .to_string(),
    )]);
    let converter = converter_with(backend.clone()).build().unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));
    assert!(outcome.errors.is_empty());

    // Header row + 4999 data rows survive the 5000-row ceiling
    let payload = &backend.payloads()[0];
    assert!(payload.contains("r4998"));
    assert!(!payload.contains("r4999"));
    assert!(!payload.contains("r5999"));
}

#[test]
fn test_unstructured_response_saved_as_single_markdown() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.csv");
    fixtures::csv_with_rows(&input, 2).unwrap();

    let backend = ScriptedBackend::new(vec![Reply::Text(
        "```markdown\n# Notes\n\nPlain response.\n```".to_string(),
    )]);
    let converter = converter_with(backend).build().unwrap();

    let out_dir = dir.path().join("out");
    let outcome = converter.convert_file(&input, &out_dir);

    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_files.len(), 1);

    let content = std::fs::read_to_string(&outcome.created_files[0]).unwrap();
    assert_eq!(content, "# Notes\n\nPlain response.");
}

// --- Fatal errors ---

#[test]
fn test_generation_exhaustion_becomes_file_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.csv");
    fixtures::csv_with_rows(&input, 2).unwrap();

    let backend = ScriptedBackend::new(vec![
        Reply::ApiError {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".to_string(),
        },
        Reply::ApiError {
            status: 400,
            message: "API key not valid. Please pass a valid API key.".to_string(),
        },
    ]);
    let converter = converter_with(backend.clone())
        .with_max_retries(2)
        .build()
        .unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));

    assert_eq!(backend.call_count(), 2);
    assert!(outcome.created_files.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].source, "data.csv");
    assert_eq!(outcome.errors[0].message, "The provided API key is not valid.");
}

#[test]
fn test_unreadable_workbook_is_fatal_for_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.xlsx");
    std::fs::write(&input, b"not a real workbook").unwrap();

    let backend = ScriptedBackend::new(vec![]);
    let converter = converter_with(backend.clone()).build().unwrap();

    let outcome = converter.convert_file(&input, dir.path().join("out"));

    // No generation attempt is made for an unreadable file
    assert_eq!(backend.call_count(), 0);
    assert!(outcome.created_files.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].message.contains("Failed to read workbook"));
}

// --- Directory processing ---

#[test]
fn test_directory_conversion_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("input");
    std::fs::create_dir(&input_dir).unwrap();

    fixtures::workbook_with_sheets(&input_dir.join("a_book.xlsx"), &["S1"]).unwrap();
    fixtures::csv_with_rows(&input_dir.join("b_data.csv"), 3).unwrap();
    std::fs::write(input_dir.join("ignored.txt"), "skip me").unwrap();

    // Workbook (sorted first) succeeds; CSV fails permanently
    let backend = ScriptedBackend::new(vec![
        files_reply("a_book", &["S1"]),
        Reply::ApiError {
            status: 429,
            message: "quota exhausted".to_string(),
        },
    ]);
    let converter = converter_with(backend.clone())
        .with_max_retries(1)
        .build()
        .unwrap();

    let outcome = converter.convert(&input_dir, dir.path().join("out"));

    assert_eq!(backend.call_count(), 2);
    assert_eq!(outcome.created_files.len(), 1);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].source, "b_data.csv");
}

#[test]
fn test_repeated_conversion_produces_same_filenames() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    fixtures::workbook_with_sheets(&input, &["Alpha", "Beta"]).unwrap();

    let run = |out: &std::path::Path| {
        let backend = ScriptedBackend::new(vec![files_reply("report", &["Alpha", "Beta"])]);
        let converter = converter_with(backend).build().unwrap();
        let outcome = converter.convert_file(&input, out);
        let mut names: Vec<String> = outcome
            .created_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    };

    let first = run(&dir.path().join("out1"));
    let second = run(&dir.path().join("out2"));
    assert_eq!(first, second);
}

// --- Rules mode ---

#[test]
fn test_rules_mode_renders_markdown_tables() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("report.xlsx");
    fixtures::workbook_with_sheets(&input, &["Alpha", "Beta"]).unwrap();

    let converter = ConverterBuilder::new()
        .with_mode(ConversionMode::Rules)
        .build()
        .unwrap();

    let out_dir = dir.path().join("out");
    let outcome = converter.convert_file(&input, &out_dir);

    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.created_files.len(), 2);

    let content = std::fs::read_to_string(out_dir.join("report_Alpha.md")).unwrap();
    assert!(content.starts_with("# Alpha"));
    assert!(content.contains("| Alpha_Header |"));
    assert!(content.contains("| Alpha_Data   |"));
}

#[test]
fn test_rules_mode_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.csv");
    fixtures::csv_with_rows(&input, 2).unwrap();

    let converter = ConverterBuilder::new()
        .with_mode(ConversionMode::Rules)
        .build()
        .unwrap();

    let out_dir = dir.path().join("out");
    let outcome = converter.convert_file(&input, &out_dir);

    assert_eq!(outcome.created_files.len(), 1);
    let content = std::fs::read_to_string(out_dir.join("data.md")).unwrap();
    assert!(content.contains("| label | value |"));
}
