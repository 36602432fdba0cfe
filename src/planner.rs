//! Batch Planner Module
//!
//! テーブル群をトークン予算とシート数上限に基づいてバッチにグループ化する
//! モジュール。モデルのコンテキスト長を超えない範囲で、できるだけ多くの
//! シートを1リクエストにまとめる。

use crate::render;
use crate::types::Table;

/// トークン数の概算器
///
/// 正確なトークナイザではなく、文字数をトークンあたりの平均文字数で割る
/// 粗いヒューリスティックです。混在コンテンツではデフォルトの除数4が
/// 妥当な近似になります。
#[derive(Debug, Clone, Copy)]
pub(crate) struct TokenEstimator {
    /// トークンあたりの平均文字数
    avg_chars_per_token: usize,
}

impl TokenEstimator {
    /// 新しい概算器を生成
    ///
    /// `avg_chars_per_token`は1以上であること（`build()`時に検証済み）。
    pub fn new(avg_chars_per_token: usize) -> Self {
        Self {
            avg_chars_per_token: avg_chars_per_token.max(1),
        }
    }

    /// テキストのトークン数を概算
    pub fn estimate(&self, text: &str) -> usize {
        text.len() / self.avg_chars_per_token
    }
}

/// バッチプランナー
///
/// 貪欲法でテーブルを走査し、実行中のトークン合計（固定の指示テンプレート
/// 分を含む）が予算を超える直前、またはシート数が上限に達した時点で
/// バッチを閉じます。
///
/// # 不変条件
///
/// - すべてのテーブルがちょうど1つのバッチに属する（欠落・重複なし）
/// - バッチ順はテーブル順を保持する
/// - 単独で予算を超えるテーブルは1テーブルのバッチになる（分割はしない）
#[derive(Debug, Clone)]
pub(crate) struct BatchPlanner {
    /// バッチあたりの推定トークン上限
    max_tokens_per_batch: usize,

    /// バッチあたりのシート数上限
    max_batch_size: usize,

    /// トークン概算器
    estimator: TokenEstimator,
}

impl BatchPlanner {
    /// 新しいプランナーを生成
    pub fn new(
        max_tokens_per_batch: usize,
        max_batch_size: usize,
        estimator: TokenEstimator,
    ) -> Self {
        Self {
            max_tokens_per_batch,
            max_batch_size,
            estimator,
        }
    }

    /// 1テーブル分の推定トークン数を計算
    ///
    /// シート区切りマーカーを含む直列化テキストに対して概算します。
    fn sheet_tokens(&self, table: &Table) -> usize {
        let sheet_text = format!(
            "=== SHEET: {} ===\n{}",
            table.name,
            render::table_to_text(table)
        );
        self.estimator.estimate(&sheet_text)
    }

    /// テーブル群をバッチに分割
    ///
    /// # 引数
    ///
    /// * `tables` - 分割対象のテーブル（順序を保持）
    /// * `overhead_tokens` - 固定の指示テンプレート＋追加指示の推定トークン数。
    ///   すべての予算比較に含まれます。
    ///
    /// # 戻り値
    ///
    /// バッチのリスト。各バッチは`tables`へのインデックスのリストです。
    pub fn plan(&self, tables: &[Table], overhead_tokens: usize) -> Vec<Vec<usize>> {
        let mut batches: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_tokens = 0usize;

        for (idx, table) in tables.iter().enumerate() {
            let sheet_tokens = self.sheet_tokens(table);
            let potential_total = overhead_tokens + current_tokens + sheet_tokens;

            if potential_total > self.max_tokens_per_batch && !current.is_empty() {
                // 予算超過: 現在のバッチを閉じ、このテーブルから新しいバッチを開始
                batches.push(std::mem::take(&mut current));
                current.push(idx);
                current_tokens = sheet_tokens;
            } else if current.len() >= self.max_batch_size {
                // シート数上限に到達
                batches.push(std::mem::take(&mut current));
                current.push(idx);
                current_tokens = sheet_tokens;
            } else {
                current.push(idx);
                current_tokens += sheet_tokens;
            }
        }

        // 残りのバッチをフラッシュ
        if !current.is_empty() {
            batches.push(current);
        }

        tracing::info!(
            batches = batches.len(),
            sheets = tables.len(),
            "Planned generation batches"
        );
        for (i, batch) in batches.iter().enumerate() {
            tracing::debug!(batch = i + 1, sheets = batch.len(), indices = ?batch, "Batch plan");
        }

        batches
    }
}
