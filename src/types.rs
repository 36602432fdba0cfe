//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use serde::Serialize;
use std::path::PathBuf;

/// セルの値を表す列挙型
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellValue {
    /// 数値（f64）
    Number(f64),

    /// 文字列
    Text(String),

    /// 論理値
    Bool(bool),

    /// 日時（Excelシリアル値）
    DateTime(f64),

    /// エラー値（例: #DIV/0!）
    Error(String),

    /// 空セル
    Empty,
}

impl CellValue {
    /// 値が空かどうかを判定
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// 1シート（または1 CSVファイル）の表データ
///
/// 読み込み後は不変として扱い、1回の変換実行が排他的に所有します。
/// 行は元の順序を保持し、各行はセル値の列です。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Table {
    /// シート名（CSVの場合はファイルのstem）
    pub name: String,

    /// 行データ（行 × 列）
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    /// 新しいTableを生成
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// 行数を取得
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// データを持たないテーブルかどうかを判定
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 正規化を適用したTableを返す
    ///
    /// - すべてのセルが空の行を除去する
    /// - 末尾のすべてのセルが空の列を除去する
    ///
    /// 内部の空列はレイアウト上の意味を持ち得るため保持します。
    pub fn normalized(mut self) -> Self {
        // 1. 全空行の除去
        self.rows.retain(|row| row.iter().any(|c| !c.is_empty()));

        // 2. 末尾の全空列の除去
        let max_cols = self.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut used_cols = 0;
        for row in &self.rows {
            for (col_idx, cell) in row.iter().enumerate() {
                if !cell.is_empty() && col_idx + 1 > used_cols {
                    used_cols = col_idx + 1;
                }
            }
        }
        if used_cols < max_cols {
            for row in &mut self.rows {
                row.truncate(used_cols);
            }
        }

        self
    }

    /// 先頭から指定行数だけを持つコピーを返す
    ///
    /// 行数が`limit`以下の場合はそのままのコピーを返します。
    pub fn head(&self, limit: usize) -> Table {
        Table {
            name: self.name.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }
}

/// AI応答から抽出された1ファイル分の結果
///
/// 不変条件: `filename`は常にMarkdown拡張子で終わる（正規化後）。
/// 空コンテンツのエントリはパーサーが除外するため、ここには到達しません。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedFile {
    /// 出力ファイル名
    pub filename: String,

    /// Markdownコンテンツ
    pub content: String,
}

/// 変換中に発生した1件の構造化エラー
///
/// JSONにシリアライズすると`{"file": ..., "error": ...}`の形になります。
/// `source`は入力ファイル名、シート単位の失敗では
/// `"<ファイル名> - <シート名>"`の形式になります。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionError {
    /// エラーの発生源（ファイル名、またはファイル名 - シート名）
    #[serde(rename = "file")]
    pub source: String,

    /// 人間可読なエラーメッセージ
    #[serde(rename = "error")]
    pub message: String,
}

impl ConversionError {
    /// 新しいエラーエントリを生成
    pub(crate) fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// 1回の変換実行の集約結果
///
/// 作成されたファイルのパスと構造化エラーの両方を保持します。
/// 部分的成功が正常系です: 呼び出し側は常に（空の可能性がある）両方の
/// リストを受け取ります。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetlm::ConverterBuilder;
///
/// # fn main() -> Result<(), sheetlm::SheetLmError> {
/// let converter = ConverterBuilder::new().with_api_key("key").build()?;
/// let outcome = converter.convert("input.xlsx", "output");
///
/// for path in &outcome.created_files {
///     println!("created: {}", path.display());
/// }
/// for err in &outcome.errors {
///     eprintln!("{}: {}", err.source, err.message);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOutcome {
    /// 作成されたMarkdownファイルのパス
    pub created_files: Vec<PathBuf>,

    /// 変換中に発生した構造化エラー
    pub errors: Vec<ConversionError>,
}

impl ConversionOutcome {
    /// 空の結果を生成
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// エラーエントリを追加
    pub(crate) fn push_error(&mut self, source: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConversionError::new(source, message));
    }

    /// 別の結果をマージ
    pub(crate) fn merge(&mut self, other: ConversionOutcome) {
        self.created_files.extend(other.created_files);
        self.errors.extend(other.errors);
    }
}
