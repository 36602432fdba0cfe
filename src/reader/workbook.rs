//! Workbook Reader
//!
//! calamineを使用したExcelファイル読み込みの実装。
//! 全シートを元の順序で`Table`に変換し、正規化（空行・末尾空列の除去）を
//! 適用します。

use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;

use crate::error::SheetLmError;
use crate::types::{CellValue, Table};

/// ワークブックの全シートを読み込む
///
/// # 引数
///
/// * `path` - Excelファイル（.xlsx / .xls）のパス
///
/// # 戻り値
///
/// * `Ok(Vec<Table>)` - シート順を保持したテーブルのリスト
/// * `Err(SheetLmError::Parse)` - ワークブックの読み込みに失敗した場合
///
/// # 注意
///
/// calamineの自動形式判定を使用するため、XLSX/XLSのどちらも同じパスで
/// 処理されます。シートは読み込み後に不変として扱われます。
pub(crate) fn read_workbook(path: &Path) -> Result<Vec<Table>, SheetLmError> {
    // 1. ワークブックを開く（形式自動判定）
    let mut workbook = open_workbook_auto(path)?;

    // 2. シート名を取得（元の順序を保持）
    let sheet_names = workbook.sheet_names().to_vec();
    tracing::info!(
        sheets = sheet_names.len(),
        path = %path.display(),
        "Reading workbook"
    );

    // 3. 各シートをTableに変換
    let mut tables = Vec::with_capacity(sheet_names.len());
    for sheet_name in &sheet_names {
        let range = workbook.worksheet_range(sheet_name)?;

        let rows: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        tables.push(Table::new(sheet_name.clone(), rows).normalized());
    }

    Ok(tables)
}

/// calamineのセルデータを`CellValue`に変換
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) => CellValue::Text(s.clone()),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(format!("{:?}", e)),
        Data::Empty => CellValue::Empty,
    }
}

// 実際のXLSXファイルが必要なテストは統合テスト（tests/）で実装します。
