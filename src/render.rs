//! Render Module
//!
//! 表データのテキスト直列化を提供するモジュール。
//! プロンプト用のプレーンテキストグリッドと、ルールベース変換用の
//! Markdownテーブルの2種類の出力を実装する。

use chrono::{Duration, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::types::{CellValue, Table};

/// Markdownテーブルの最小列幅（区切り行`---`の幅）
const MIN_COLUMN_WIDTH: usize = 3;

/// セル値を表示用文字列に変換
///
/// # 変換規則
///
/// - 数値: 整数値は小数点なしで出力（例: `42`）、それ以外はそのまま
/// - 文字列: そのまま
/// - 論理値: `TRUE` / `FALSE`
/// - 日時: シリアル値をISO 8601形式に変換
/// - エラー値: エラー文字列をそのまま
/// - 空セル: 空文字列
pub(crate) fn format_cell(value: &CellValue) -> String {
    match value {
        CellValue::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        CellValue::Text(s) => s.clone(),
        CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::DateTime(serial) => format_serial_datetime(*serial),
        CellValue::Error(e) => e.clone(),
        CellValue::Empty => String::new(),
    }
}

/// Excelシリアル日時値をISO 8601文字列に変換
///
/// 1900年システム（1899年12月30日起算）として処理します。
/// 時刻成分（小数部）がある場合は`YYYY-MM-DD HH:MM:SS`、
/// ない場合は`YYYY-MM-DD`を返します。
///
/// 変換できないシリアル値（範囲外）は数値のまま文字列化します。
fn format_serial_datetime(serial: f64) -> String {
    let epoch = match NaiveDate::from_ymd_opt(1899, 12, 30) {
        Some(d) => d,
        None => return serial.to_string(),
    };

    let days = serial.floor() as i64;
    let date = match epoch.checked_add_signed(Duration::days(days)) {
        Some(d) => d,
        None => return serial.to_string(),
    };

    let day_fraction = serial - serial.floor();
    if day_fraction > 0.0 {
        let seconds = (day_fraction * 86_400.0).round() as u32;
        let (hours, rem) = (seconds / 3600, seconds % 3600);
        let (minutes, secs) = (rem / 60, rem % 60);
        format!(
            "{} {:02}:{:02}:{:02}",
            date.format("%Y-%m-%d"),
            hours.min(23),
            minutes,
            secs
        )
    } else {
        date.format("%Y-%m-%d").to_string()
    }
}

/// Markdown特殊文字をエスケープ
///
/// パイプ文字はテーブル区切りと衝突するため`\|`に、改行はセル内改行として
/// `<br>`に変換します。
fn escape_markdown(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace('\n', "<br>")
}

/// 各列の表示幅を計算（内部ヘルパー）
///
/// 全角文字は幅2、半角文字は幅1として計算し、列ごとの最大幅を返します。
fn column_widths(cells: &[Vec<String>], min_width: usize) -> Vec<usize> {
    let cols = cells.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![min_width; cols];

    for row in cells {
        for (col_idx, content) in row.iter().enumerate() {
            let w = content.width();
            if w > widths[col_idx] {
                widths[col_idx] = w;
            }
        }
    }

    widths
}

/// 表をプレーンテキストのグリッドとして直列化
///
/// プロンプトのデータセクション用の形式です。各列は表示幅で左揃えされ、
/// 2スペースで区切られます。Markdownエスケープは適用しません
/// （モデルには生の内容を渡す）。
pub(crate) fn table_to_text(table: &Table) -> String {
    if table.is_empty() {
        return String::new();
    }

    // 1. 全セルを文字列化
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(format_cell).collect())
        .collect();

    // 2. 列幅の計算
    let widths = column_widths(&cells, 0);

    // 3. 行の組み立て
    let mut out = String::new();
    for row in &cells {
        let mut line = String::new();
        for (col_idx, content) in row.iter().enumerate() {
            if col_idx > 0 {
                line.push_str("  ");
            }
            line.push_str(content);
            // 最終列はパディングしない
            if col_idx + 1 < row.len() {
                let pad = widths[col_idx].saturating_sub(content.width());
                for _ in 0..pad {
                    line.push(' ');
                }
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }

    out
}

/// 表をMarkdownテーブルとして直列化
///
/// ルールベース変換モードの出力形式です。先頭行をヘッダーとして扱い、
/// 2行目に区切り行を挿入します。列は表示幅で揃えられます。
///
/// # 出力例
///
/// ```markdown
/// | Header1 | Header2 |
/// | ------- | ------- |
/// | Data1   | Data2   |
/// ```
pub(crate) fn table_to_markdown(table: &Table) -> String {
    if table.is_empty() {
        return "_No data_\n".to_string();
    }

    // 1. 全セルをエスケープ済み文字列化
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| escape_markdown(format_cell(v).trim()))
                .collect()
        })
        .collect();

    let cols = cells.iter().map(Vec::len).max().unwrap_or(0);

    // 2. 列幅の計算
    let widths = column_widths(&cells, MIN_COLUMN_WIDTH);

    // 3. ヘッダー区切り行
    let mut separator = String::from("|");
    for width in &widths {
        separator.push(' ');
        separator.push_str(&"-".repeat(*width));
        separator.push_str(" |");
    }

    // 4. 各行の出力
    let mut out = String::new();
    for (row_idx, row) in cells.iter().enumerate() {
        out.push('|');
        for col_idx in 0..cols {
            let content = row.get(col_idx).map(String::as_str).unwrap_or("");
            out.push(' ');
            out.push_str(content);
            let pad = widths[col_idx].saturating_sub(content.width());
            for _ in 0..pad {
                out.push(' ');
            }
            out.push_str(" |");
        }
        out.push('\n');

        // 最初の行の後に区切り行を挿入
        if row_idx == 0 {
            out.push_str(&separator);
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_format_cell_number() {
        assert_eq!(format_cell(&CellValue::Number(42.0)), "42");
        assert_eq!(format_cell(&CellValue::Number(-3.0)), "-3");
        assert_eq!(format_cell(&CellValue::Number(2.5)), "2.5");
    }

    #[test]
    fn test_format_cell_bool() {
        assert_eq!(format_cell(&CellValue::Bool(true)), "TRUE");
        assert_eq!(format_cell(&CellValue::Bool(false)), "FALSE");
    }

    #[test]
    fn test_format_cell_empty() {
        assert_eq!(format_cell(&CellValue::Empty), "");
    }

    #[test]
    fn test_format_serial_date() {
        // シリアル値45000 = 2023-03-15（1899-12-30起算）
        assert_eq!(format_cell(&CellValue::DateTime(45000.0)), "2023-03-15");
    }

    #[test]
    fn test_format_serial_datetime_with_time() {
        // 0.5 = 正午
        assert_eq!(
            format_cell(&CellValue::DateTime(45000.5)),
            "2023-03-15 12:00:00"
        );
    }

    #[test]
    fn test_table_to_text_alignment() {
        let table = Table::new(
            "Sheet1",
            vec![
                vec![text("name"), text("value")],
                vec![text("a"), text("1")],
            ],
        );

        let out = table_to_text(&table);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("name"));
        // "a"は"name"の幅（4）までパディングされる
        assert_eq!(lines[1], "a     1");
    }

    #[test]
    fn test_table_to_text_empty() {
        let table = Table::new("Empty", vec![]);
        assert_eq!(table_to_text(&table), "");
    }

    #[test]
    fn test_table_to_markdown_basic() {
        let table = Table::new(
            "Sheet1",
            vec![
                vec![text("Header1"), text("Header2")],
                vec![text("Data1"), text("Data2")],
            ],
        );

        let out = table_to_markdown(&table);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "| Header1 | Header2 |");
        assert_eq!(lines[1], "| ------- | ------- |");
        assert_eq!(lines[2], "| Data1   | Data2   |");
    }

    #[test]
    fn test_table_to_markdown_escapes_pipes_and_newlines() {
        let table = Table::new(
            "Sheet1",
            vec![
                vec![text("a|b"), text("c\nd")],
                vec![text("x"), text("y")],
            ],
        );

        let out = table_to_markdown(&table);
        assert!(out.contains("a\\|b"));
        assert!(out.contains("c<br>d"));
    }

    #[test]
    fn test_table_to_markdown_empty() {
        let table = Table::new("Empty", vec![]);
        assert_eq!(table_to_markdown(&table), "_No data_\n");
    }

    #[test]
    fn test_table_to_markdown_ragged_rows_padded() {
        // 列数が揃わない行は空セルで埋められる
        let table = Table::new(
            "Sheet1",
            vec![
                vec![text("a"), text("b"), text("c")],
                vec![text("d")],
            ],
        );

        let out = table_to_markdown(&table);
        for line in out.lines() {
            assert_eq!(line.matches('|').count(), 4);
        }
    }

    #[test]
    fn test_table_to_markdown_fullwidth_alignment() {
        // 全角文字は表示幅2として扱われる
        let table = Table::new(
            "Sheet1",
            vec![vec![text("項目"), text("値")], vec![text("a"), text("b")]],
        );

        let out = table_to_markdown(&table);
        // "項目"の表示幅は4なので、"a"の列は幅4までパディングされる
        assert!(out.contains("| a    |"));
    }
}
