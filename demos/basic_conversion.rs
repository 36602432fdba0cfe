//! 基本的な変換の例
//!
//! 環境変数`GEMINI_API_KEY`を設定した上で実行してください:
//!
//! ```bash
//! cargo run --example basic_conversion -- input.xlsx output_dir
//! ```

use sheetlm::ConverterBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input.xlsx|input.csv> <output_dir>", args[0]);
        std::process::exit(1);
    }

    // デフォルト設定の変換器を構築（APIキーは環境変数から解決）
    let converter = ConverterBuilder::new().build()?;

    let outcome = converter.convert(&args[1], &args[2]);

    for path in &outcome.created_files {
        println!("created: {}", path.display());
    }
    for error in &outcome.errors {
        eprintln!("error [{}]: {}", error.source, error.message);
    }

    Ok(())
}
