//! Prompt Builder Module
//!
//! 1バッチ（または1シート）分のリクエストペイロードを組み立てるモジュール。
//! 固定の指示テンプレート、ユーザー追加指示、直列化済み表データを
//! この順で連結する。

use crate::planner::TokenEstimator;
use crate::render;
use crate::types::Table;

/// 単一テーブル用の指示テンプレート
///
/// 1ファイルを持つJSONオブジェクトを返すようモデルに指示します。
pub(crate) const SINGLE_TEMPLATE: &str = r#"You are a document-structure transformation engine.
Preserve ALL content while improving semantic clarity.

RULES:
- Do NOT remove, summarize, or rewrite content. Layout MAY change for readability.
- Preserve the original logical order of content.
- Empty cells used only for layout MAY be removed.
- Convert layout-style tables (sparse, alignment-only) into headings, bullet
  lists, and paragraphs; convert data tables (headers plus consistent rows)
  into Markdown tables.

OUTPUT:
- Return a JSON object with a single key "files".
- "files" is a list of objects with "filename" (must end in .md) and
  "content" (the full Markdown text).
- Valid JSON only. Do not include explanation text outside the JSON.
"#;

/// バッチ用の指示テンプレート
///
/// 入力シートごとにちょうど1ファイルを返し、シート間でコンテンツを
/// 混在させないことを明示的に要求します。
pub(crate) const BATCH_TEMPLATE: &str = r#"You are a document-structure transformation engine.
Preserve ALL content while improving semantic clarity.

You are processing MULTIPLE SHEETS in a SINGLE BATCH.

RULES:
- Do NOT remove, summarize, or rewrite content. Layout MAY change for readability.
- Each sheet is marked with "=== SHEET: sheet_name ===".
- You MUST create a SEPARATE FILE for EACH SHEET.
- Do NOT mix content between different sheets.
- Preserve the sheet name in the output filename.
- Convert layout-style tables (sparse, alignment-only) into headings, bullet
  lists, and paragraphs; convert data tables (headers plus consistent rows)
  into Markdown tables.

OUTPUT FORMAT (CRITICAL):
- Return a JSON object with a single key "files".
- "files" MUST be a list with ONE OBJECT PER SHEET, each with "filename"
  (the sheet name with .md extension) and "content" (the full Markdown text
  for that sheet only).
- The number of files in your response MUST match the number of sheets in
  the input.
- Valid JSON only. Do not include explanation text outside the JSON.
"#;

/// シート区切りの罫線（80文字）
const RULE_LINE: &str =
    "================================================================================";

/// プロンプトビルダー
///
/// ユーザー追加指示と行数上限を保持し、各リクエストのペイロード文字列を
/// 生成します。ペイロードは不変であり、リトライ間で再利用されます。
#[derive(Debug, Clone)]
pub(crate) struct PromptBuilder {
    /// ユーザー追加指示（固定テンプレートの後、データセクションの前に挿入）
    additional_instructions: Option<String>,

    /// 1テーブルあたりの行数上限（超過分は直列化前に切り捨て）
    row_limit: usize,
}

impl PromptBuilder {
    /// 新しいプロンプトビルダーを生成
    pub fn new(additional_instructions: Option<String>, row_limit: usize) -> Self {
        Self {
            additional_instructions,
            row_limit,
        }
    }

    /// 固定指示部分の推定トークン数
    ///
    /// バッチプランナーの予算比較に使用されます。バッチテンプレートと
    /// 追加指示の合計で概算します。
    pub fn instruction_overhead(&self, estimator: &TokenEstimator) -> usize {
        let mut overhead = estimator.estimate(BATCH_TEMPLATE);
        if let Some(ref extra) = self.additional_instructions {
            overhead += estimator.estimate(extra);
        }
        overhead
    }

    /// バッチ用のリクエストペイロードを組み立てる
    pub fn build_batch_prompt(&self, tables: &[&Table]) -> String {
        let mut prompt = String::from(BATCH_TEMPLATE);
        prompt.push('\n');
        self.push_additional_instructions(&mut prompt);

        prompt.push_str(&format!(
            "\nHere is the batch data containing {} sheets:\n\n",
            tables.len()
        ));
        prompt.push_str(&self.merge_sheets(tables));

        prompt
    }

    /// 単一シート用（フォールバック時）のリクエストペイロードを組み立てる
    pub fn build_sheet_prompt(&self, table: &Table) -> String {
        let mut prompt = String::from(SINGLE_TEMPLATE);
        prompt.push_str("\nIMPORTANT: You are converting a SINGLE sheet. Return the result for this sheet only.\n");
        self.push_additional_instructions(&mut prompt);

        prompt.push_str("\nHere is the file data:\n\n");
        prompt.push_str(&format!("### Sheet: {}\n", table.name));
        prompt.push_str(&render::table_to_text(&self.truncated(table)));

        prompt
    }

    /// CSV用のリクエストペイロードを組み立てる
    pub fn build_csv_prompt(&self, table: &Table, file_name: &str) -> String {
        let mut prompt = String::from(SINGLE_TEMPLATE);
        self.push_additional_instructions(&mut prompt);

        prompt.push_str("\nHere is the file data:\n\n");
        prompt.push_str(&format!("CSV file '{}':\n\n", file_name));
        prompt.push_str(&render::table_to_text(&self.truncated(table)));

        prompt
    }

    /// 追加指示をプロンプトに挿入（設定されている場合のみ）
    fn push_additional_instructions(&self, prompt: &mut String) {
        if let Some(ref extra) = self.additional_instructions {
            prompt.push_str("\nADDITIONAL INSTRUCTIONS:\n");
            prompt.push_str(extra);
            prompt.push('\n');
        }
    }

    /// 複数シートを区切りマーカー付きで1つのデータセクションに結合
    fn merge_sheets(&self, tables: &[&Table]) -> String {
        let mut combined = format!("Processing {} sheets in this batch.\n\n", tables.len());

        for table in tables {
            let table = self.truncated(table);

            // シート区切りマーカー
            combined.push_str(RULE_LINE);
            combined.push('\n');
            combined.push_str(&format!("=== SHEET: {} ===\n", table.name));
            combined.push_str(RULE_LINE);
            combined.push_str("\n\n");

            combined.push_str(&render::table_to_text(&table));
            combined.push('\n');
        }

        combined.push_str(RULE_LINE);
        combined.push('\n');
        combined.push_str(&format!("END OF BATCH - Total sheets: {}\n", tables.len()));
        combined.push_str(RULE_LINE);
        combined.push('\n');

        combined
    }

    /// 行数上限を適用したテーブルを返す
    ///
    /// 切り捨ては警告としてログに記録されますが、エラーにはなりません。
    fn truncated(&self, table: &Table) -> Table {
        if table.row_count() > self.row_limit {
            tracing::warn!(
                sheet = %table.name,
                rows = table.row_count(),
                limit = self.row_limit,
                "Sheet exceeds row limit, truncating"
            );
            table.head(self.row_limit)
        } else {
            table.clone()
        }
    }
}
