//! Response Parser Module
//!
//! AI応答テキストから(ファイル名, 内容)ペアの構造化リストを抽出する
//! モジュール。3段階の抽出カスケードと、非構造化テキストへの
//! フォールバックを実装する。この解析は決して失敗しない:
//! 構造化抽出が不可能な場合でも、応答全体を1つのMarkdownファイルと
//! して返す。

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::materialize::sanitize_component;
use crate::types::ParsedFile;

/// モデル応答の解釈結果
///
/// 外部サービスの動的な応答形状を、順序付きフォールバックで解決した
/// タグ付き結果として表現します。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ModelResponse {
    /// `files`キーを持つJSONとして解釈できた応答
    Structured(Vec<FileEntry>),

    /// 構造化抽出に失敗した応答（全文をそのまま保持）
    Unstructured(String),
}

/// `files`リストの1エントリ
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct FileEntry {
    /// モデルが提案したファイル名（欠落の場合あり）
    #[serde(default)]
    pub filename: Option<String>,

    /// Markdownコンテンツ（欠落時は空文字列）
    #[serde(default)]
    pub content: String,
}

/// 応答テキストを解釈する
///
/// # 抽出カスケード（最初に成功したものを採用）
///
/// 1. 全文を直接JSONとして解析
/// 2. ` ```json `フェンスブロックの内部を解析
/// 3. 最初の`{`から最後の`}`までのスパンを解析
/// 4. いずれも失敗、または解析結果に`files`キーがない場合は非構造化
pub(crate) fn interpret(raw_text: &str) -> ModelResponse {
    let value = serde_json::from_str::<serde_json::Value>(raw_text)
        .ok()
        .or_else(|| find_fenced_json(raw_text))
        .or_else(|| find_brace_span(raw_text));

    if let Some(value) = value {
        if let Some(files) = value.get("files").and_then(|f| f.as_array()) {
            let entries: Vec<FileEntry> = files
                .iter()
                .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
                .collect();
            return ModelResponse::Structured(entries);
        }
        tracing::warn!("Response parsed as JSON but lacks a 'files' key, saving as plain markdown");
    }

    ModelResponse::Unstructured(raw_text.to_string())
}

/// ` ```json `フェンスブロックの内部をJSONとして解析
fn find_fenced_json(raw_text: &str) -> Option<serde_json::Value> {
    static FENCE_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = FENCE_PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("valid fence pattern")
    });

    let inner = pattern.captures(raw_text)?.get(1)?.as_str();
    serde_json::from_str(inner).ok()
}

/// 最初の`{`から最後の`}`までのスパンをJSONとして解析
fn find_brace_span(raw_text: &str) -> Option<serde_json::Value> {
    let start = raw_text.find('{')?;
    let end = raw_text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw_text[start..=end]).ok()
}

/// 先頭・末尾のコードフェンスを除去
///
/// モデルがMarkdown全体を` ```markdown `ブロックで包んで返す場合の
/// クリーンアップです。
fn strip_markdown_fence(content: &str) -> String {
    let trimmed = content.trim();

    let without_leading = if let Some(rest) = trimmed.strip_prefix("```") {
        // 言語タグ付きの開始フェンス行を丸ごと除去
        match rest.find('\n') {
            Some(pos) => &rest[pos + 1..],
            None => rest,
        }
    } else {
        trimmed
    };

    let without_trailing = without_leading
        .trim_end()
        .strip_suffix("```")
        .map(str::trim_end)
        .unwrap_or_else(|| without_leading.trim_end());

    without_trailing.to_string()
}

/// ファイル名を出力規約に正規化
///
/// - パス区切り等をサニタイズ
/// - Markdown拡張子を強制
/// - base名プレフィックスを付与（既に付いている場合を除く）
fn normalize_filename(filename: &str, base_name: &str) -> String {
    let mut name = sanitize_component(filename);

    if !name.ends_with(".md") {
        name.push_str(".md");
    }

    if !name.starts_with(base_name) {
        name = format!("{}_{}", base_name, name);
    }

    name
}

/// 応答を解析し、保存可能なファイルのリストを返す
///
/// # 引数
///
/// * `raw_text` - 生成サービスからの生の応答テキスト
/// * `expected_names` - バッチに含めたシート名（件数検証用。単一シート/
///   CSVでは空リスト）
/// * `base_name` - 入力ファイルのstem（ファイル名プレフィックス）
/// * `fallback_stem` - 非構造化フォールバック時のファイル名stem
///
/// # 保証
///
/// この関数は決して失敗しません。構造化抽出が不可能な場合は、応答全文を
/// 1つのMarkdownファイルとして返します。件数不一致は警告ログのみで、
/// ファイル群はそのまま保存対象になります。
pub(crate) fn parse(
    raw_text: &str,
    expected_names: &[String],
    base_name: &str,
    fallback_stem: &str,
) -> Vec<ParsedFile> {
    match interpret(raw_text) {
        ModelResponse::Structured(entries) => {
            if !expected_names.is_empty() && entries.len() != expected_names.len() {
                tracing::warn!(
                    expected = expected_names.len(),
                    got = entries.len(),
                    "Batch response file count mismatch"
                );
            }

            let mut files = Vec::with_capacity(entries.len());
            for (idx, entry) in entries.into_iter().enumerate() {
                if entry.content.is_empty() {
                    tracing::warn!(index = idx, "Skipping response entry with empty content");
                    continue;
                }

                let filename = entry
                    .filename
                    .unwrap_or_else(|| format!("sheet_{}.md", idx));
                files.push(ParsedFile {
                    filename: normalize_filename(&filename, base_name),
                    content: entry.content,
                });
            }
            files
        }

        ModelResponse::Unstructured(text) => {
            vec![ParsedFile {
                filename: normalize_filename(&format!("{}.md", fallback_stem), base_name),
                content: strip_markdown_fence(&text),
            }]
        }
    }
}
