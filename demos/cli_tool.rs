//! 簡易CLIツールの例
//!
//! ディレクトリまたは単一ファイルをMarkdownに変換します。
//! `--rules`を指定するとAIを使わない決定論的変換になります。
//!
//! ```bash
//! cargo run --example cli_tool -- ./spreadsheets ./output
//! cargo run --example cli_tool -- ./spreadsheets ./output --rules
//! ```

use std::time::Duration;

use sheetlm::{ConversionMode, ConverterBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <output_dir> [--rules]", args[0]);
        std::process::exit(1);
    }

    let rules_mode = args.iter().any(|a| a == "--rules");

    let mode = if rules_mode {
        ConversionMode::Rules
    } else {
        ConversionMode::Ai
    };

    let converter = ConverterBuilder::new()
        .with_mode(mode)
        .with_batch_delay(Duration::from_secs(10))
        .build()?;

    let outcome = converter.convert(&args[1], &args[2]);

    println!(
        "{} files created, {} errors",
        outcome.created_files.len(),
        outcome.errors.len()
    );
    for error in &outcome.errors {
        eprintln!("  [{}] {}", error.source, error.message);
    }

    if !outcome.errors.is_empty() {
        std::process::exit(2);
    }

    Ok(())
}
