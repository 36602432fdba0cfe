//! File Materializer Module
//!
//! 解析済みのファイル内容を出力ディレクトリに書き込むモジュール。
//! ファイル名のサニタイズと出力ディレクトリの作成もここで行う。

use std::path::{Path, PathBuf};

use crate::error::SheetLmError;
use crate::types::ParsedFile;

/// 解析済みファイルをディスクに書き込む
///
/// 出力ディレクトリが存在しない場合は作成します。同一ファイル名への
/// 2回目の書き込みは前の内容を上書きします（実行内でのファイル名衝突は
/// base名プレフィックス規則により通常発生しない前提の、許容済みリスク）。
///
/// # 戻り値
///
/// * `Ok(Vec<PathBuf>)` - 作成されたファイルのパス（入力順）
/// * `Err(SheetLmError::Io)` - ディレクトリ作成または書き込みに失敗した場合
pub(crate) fn write_files(
    files: &[ParsedFile],
    output_dir: &Path,
) -> Result<Vec<PathBuf>, SheetLmError> {
    std::fs::create_dir_all(output_dir)?;

    let mut created = Vec::with_capacity(files.len());
    for file in files {
        let path = output_dir.join(&file.filename);
        std::fs::write(&path, &file.content)?;
        tracing::info!(file = %path.display(), "Created markdown file");
        created.push(path);
    }

    Ok(created)
}

/// ファイル名の1要素をサニタイズ
///
/// パス区切りやOSで使用できない文字を`_`に置換します。モデルが返す
/// ファイル名が出力ディレクトリの外を指すことを防ぎます。
pub(crate) fn sanitize_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = sanitized.trim().trim_matches('.');
    if trimmed.is_empty() {
        "sheet".to_string()
    } else {
        trimmed.to_string()
    }
}
