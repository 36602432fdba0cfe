//! CSV Reader
//!
//! 区切りテキストファイルを単一の`Table`として読み込むモジュール。
//! テキストエンコーディングは自動判定し、BOM検出 → UTF-8厳密 →
//! Windows-1252（Latin-1上位互換）の順でフォールバックします。

use encoding_rs::{Encoding, WINDOWS_1252};
use std::path::Path;

use crate::error::SheetLmError;
use crate::types::{CellValue, Table};

/// CSVファイルを1つの`Table`として読み込む
///
/// # 引数
///
/// * `path` - CSVファイルのパス
///
/// # 戻り値
///
/// * `Ok(Table)` - ファイルのstemを名前に持つテーブル
/// * `Err(SheetLmError)` - ファイルが読めない、またはレコード解析に
///   失敗した場合
pub(crate) fn read_csv(path: &Path) -> Result<Table, SheetLmError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());

    read_csv_bytes(&bytes, &name)
}

/// バイト列からCSVを読み込む（内部実装）
///
/// 行の長さは揃っていなくてもよく（flexible）、先頭行もデータとして
/// 保持します（ヘッダー解釈はモデルまたはMarkdownレンダラーの責務）。
fn read_csv_bytes(bytes: &[u8], name: &str) -> Result<Table, SheetLmError> {
    // 1. エンコーディング判定とデコード
    let (text, encoding) = decode_bytes(bytes);
    tracing::debug!(encoding, "Decoded CSV input");

    // 2. レコードの読み取り
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(Table::new(name, rows).normalized())
}

/// バイト列をデコードし、（テキスト, 使用エンコーディング名）を返す
///
/// フォールバック順序: BOM検出 → UTF-8厳密 → Windows-1252。
/// Windows-1252はすべてのバイト列を受理するため、この関数は失敗しません。
fn decode_bytes(bytes: &[u8]) -> (String, &'static str) {
    // 1. BOMによる判定
    if let Some((encoding, _bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_with_bom_removal(bytes);
        return (text.into_owned(), encoding.name());
    }

    // 2. UTF-8厳密デコード
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), "UTF-8");
    }

    // 3. Windows-1252フォールバック
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    (text.into_owned(), WINDOWS_1252.name())
}
