//! sheetlm - AI-assisted Excel/CSV to Markdown converter
//!
//! This crate converts spreadsheet workbooks (XLSX/XLS) and CSV files into
//! Markdown documents by delegating structural interpretation to the Gemini
//! generative API. Sheets are grouped into context-sized batches, sent with
//! retry/backoff and rate-limit-aware delays, and the semi-structured JSON
//! responses are parsed into one Markdown file per sheet. A deterministic
//! rule-based mode is available for offline conversion.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sheetlm::ConverterBuilder;
//!
//! fn main() -> Result<(), sheetlm::SheetLmError> {
//!     // Create a converter with default settings
//!     // (the API key is read from the GEMINI_API_KEY environment variable)
//!     let converter = ConverterBuilder::new().build()?;
//!
//!     // Convert a workbook; one Markdown file is produced per sheet
//!     let outcome = converter.convert("report.xlsx", "output");
//!
//!     for path in &outcome.created_files {
//!         println!("created: {}", path.display());
//!     }
//!     for error in &outcome.errors {
//!         eprintln!("{}: {}", error.source, error.message);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Custom Configuration
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sheetlm::ConverterBuilder;
//!
//! fn main() -> Result<(), sheetlm::SheetLmError> {
//!     let converter = ConverterBuilder::new()
//!         .with_api_key("your-api-key")
//!         .with_model("gemini-2.5-flash")
//!         .with_additional_instructions("Keep Japanese text as-is.")
//!         .with_max_batch_size(10)
//!         .with_batch_delay(Duration::from_secs(15))
//!         .build()?;
//!
//!     let outcome = converter.convert("input_dir", "output");
//!     println!("{} files created", outcome.created_files.len());
//!     Ok(())
//! }
//! ```
//!
//! # Offline (Rule-Based) Conversion
//!
//! ```rust,no_run
//! use sheetlm::{ConverterBuilder, ConversionMode};
//!
//! # fn main() -> Result<(), sheetlm::SheetLmError> {
//! // No API key needed; each sheet becomes a Markdown table
//! let converter = ConverterBuilder::new()
//!     .with_mode(ConversionMode::Rules)
//!     .build()?;
//! let outcome = converter.convert("report.xlsx", "output");
//! # Ok(())
//! # }
//! ```
//!
//! # Custom Backends
//!
//! The network seam is the [`GenerationBackend`] trait; tests and alternative
//! providers can inject their own implementation:
//!
//! ```rust,no_run
//! use sheetlm::{ConverterBuilder, GenerationBackend, GenerationError};
//!
//! struct FixedBackend;
//!
//! impl GenerationBackend for FixedBackend {
//!     fn generate(&self, _payload: &str) -> Result<String, GenerationError> {
//!         Ok(r##"{"files": [{"filename": "out.md", "content": "# Fixed"}]}"##.to_string())
//!     }
//! }
//!
//! # fn main() -> Result<(), sheetlm::SheetLmError> {
//! let converter = ConverterBuilder::new()
//!     .with_backend(Box::new(FixedBackend))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod api;
mod builder;
mod client;
mod error;
mod materialize;
mod planner;
mod prompt;
mod reader;
mod render;
mod response;
mod types;

// 公開API
pub use api::ConversionMode;
pub use builder::{Converter, ConverterBuilder};
pub use client::{GeminiClient, GenerationBackend};
pub use error::{GenerationError, SheetLmError};
pub use types::{ConversionError, ConversionOutcome};
