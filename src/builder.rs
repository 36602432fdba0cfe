//! Builder Module
//!
//! Fluent Builder APIを提供し、`Converter`インスタンスを段階的に構築する。
//! `Converter`は変換コーディネーターとして、ファイル単位・バッチ単位・
//! シート単位のフローを統括する。

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ConversionMode;
use crate::client::{GeminiClient, GenerationBackend, GenerationClient, RetryPolicy};
use crate::error::SheetLmError;
use crate::materialize::{self, sanitize_component};
use crate::planner::{BatchPlanner, TokenEstimator};
use crate::prompt::PromptBuilder;
use crate::reader;
use crate::render;
use crate::response;
use crate::types::{ConversionOutcome, ParsedFile, Table};

/// デフォルトのモデル識別子
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// APIキーを解決する環境変数名
const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// 変換処理の設定を保持する内部構造体
#[derive(Debug, Clone)]
pub(crate) struct ConversionSettings {
    /// 変換モード
    pub mode: ConversionMode,

    /// モデル識別子
    pub model: String,

    /// ユーザー追加指示
    pub additional_instructions: Option<String>,

    /// バッチあたりの推定トークン上限
    pub max_tokens_per_batch: usize,

    /// バッチあたりのシート数上限
    pub max_batch_size: usize,

    /// トークンあたりの平均文字数（概算用の除数）
    pub avg_chars_per_token: usize,

    /// 1テーブルあたりの行数上限
    pub row_limit: usize,

    /// バッチ間の待機時間（2番目以降のバッチの前に挿入）
    pub batch_delay: Duration,

    /// フォールバック時のシート間待機時間
    pub sheet_delay: Duration,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            mode: ConversionMode::Ai,
            model: DEFAULT_MODEL.to_string(),
            additional_instructions: None,
            max_tokens_per_batch: 800_000,
            max_batch_size: 20,
            avg_chars_per_token: 4,
            row_limit: 5000,
            batch_delay: Duration::from_secs(10),
            sheet_delay: Duration::from_secs(5),
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `Converter`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみを
/// オーバーライドできます。
///
/// APIキーは明示的な指定 > 環境変数`GEMINI_API_KEY`の優先順位で、
/// `build()`時に1回だけ解決されます。深い呼び出し経路での暗黙的な
/// 環境参照は行いません。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetlm::{ConverterBuilder, ConversionMode};
///
/// # fn main() -> Result<(), sheetlm::SheetLmError> {
/// let converter = ConverterBuilder::new()
///     .with_api_key("your-api-key")
///     .with_model("gemini-2.5-flash")
///     .with_max_batch_size(10)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ConverterBuilder {
    /// 内部設定（構築中）
    settings: ConversionSettings,

    /// 明示的に指定されたAPIキー
    api_key: Option<String>,

    /// リトライ試行回数の上限
    max_retries: u32,

    /// 指数バックオフの初期待機時間
    initial_retry_delay: Duration,

    /// テスト・拡張用に注入されたバックエンド
    backend: Option<Box<dyn GenerationBackend>>,
}

impl Default for ConverterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - 変換モード: AI変換
    /// - モデル: `gemini-2.5-flash`
    /// - バッチあたりのトークン上限: 800,000
    /// - バッチあたりのシート数上限: 20
    /// - 行数上限: 5000
    /// - バッチ間待機: 10秒 / フォールバック時のシート間待機: 5秒
    /// - リトライ上限: 5回 / 初期待機: 10秒
    pub fn new() -> Self {
        Self {
            settings: ConversionSettings::default(),
            api_key: None,
            max_retries: 5,
            initial_retry_delay: Duration::from_secs(10),
            backend: None,
        }
    }

    /// 変換モードを指定する
    pub fn with_mode(mut self, mode: ConversionMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// APIキーを明示的に指定する
    ///
    /// 指定しない場合、`build()`時に環境変数`GEMINI_API_KEY`が参照されます。
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// モデル識別子を指定する
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.settings.model = model.into();
        self
    }

    /// ユーザー追加指示を指定する
    ///
    /// 固定の指示テンプレートの後、データセクションの前に挿入されます。
    pub fn with_additional_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.settings.additional_instructions = Some(instructions.into());
        self
    }

    /// バッチあたりのシート数上限を指定する
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.settings.max_batch_size = max_batch_size;
        self
    }

    /// バッチあたりの推定トークン上限を指定する
    pub fn with_max_tokens_per_batch(mut self, max_tokens: usize) -> Self {
        self.settings.max_tokens_per_batch = max_tokens;
        self
    }

    /// 1テーブルあたりの行数上限を指定する
    ///
    /// 超過分はプロンプト構築前に切り捨てられます（警告ログのみ）。
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.settings.row_limit = row_limit;
        self
    }

    /// バッチ間の待機時間を指定する
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.settings.batch_delay = delay;
        self
    }

    /// フォールバック時のシート間待機時間を指定する
    pub fn with_sheet_delay(mut self, delay: Duration) -> Self {
        self.settings.sheet_delay = delay;
        self
    }

    /// リトライ試行回数の上限を指定する
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 指数バックオフの初期待機時間を指定する
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    /// 生成バックエンドを注入する
    ///
    /// テストでのモック注入、または別プロバイダー実装の差し替えに
    /// 使用します。指定した場合、APIキーの解決は行われません。
    pub fn with_backend(mut self, backend: Box<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 設定を検証し、`Converter`インスタンスを生成する
    ///
    /// # 発生し得るエラー
    ///
    /// * `SheetLmError::Config(String)`: 設定の検証に失敗した場合
    ///   * AIモードでAPIキーが解決できない（明示指定も環境変数もない）
    ///   * `max_batch_size`または`max_tokens_per_batch`が0
    ///   * `max_retries`が0
    pub fn build(self) -> Result<Converter, SheetLmError> {
        // 1. 数値設定の検証
        if self.settings.max_batch_size == 0 {
            return Err(SheetLmError::Config(
                "max_batch_size must be at least 1".to_string(),
            ));
        }
        if self.settings.max_tokens_per_batch == 0 {
            return Err(SheetLmError::Config(
                "max_tokens_per_batch must be at least 1".to_string(),
            ));
        }
        if self.settings.row_limit == 0 {
            return Err(SheetLmError::Config(
                "row_limit must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(SheetLmError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }

        // 2. 生成クライアントの構築（AIモードのみ）
        let client = match self.settings.mode {
            ConversionMode::Ai => {
                let backend = match self.backend {
                    Some(backend) => backend,
                    None => {
                        // APIキーの解決: 明示指定 > 環境変数
                        let api_key = self
                            .api_key
                            .or_else(|| std::env::var(API_KEY_ENV).ok())
                            .ok_or_else(|| {
                                SheetLmError::Config(format!(
                                    "API key is required. Pass it explicitly or set {}",
                                    API_KEY_ENV
                                ))
                            })?;
                        Box::new(GeminiClient::new(api_key, self.settings.model.clone()))
                            as Box<dyn GenerationBackend>
                    }
                };

                let policy = RetryPolicy {
                    max_retries: self.max_retries,
                    initial_delay: self.initial_retry_delay,
                    ..RetryPolicy::default()
                };
                Some(GenerationClient::new(backend, policy))
            }
            ConversionMode::Rules => None,
        };

        // 3. Converterインスタンス生成
        Ok(Converter::new(self.settings, client))
    }
}

/// 変換処理のファサード（変換コーディネーター）
///
/// 入力ファイルごとに以下の状態機械を実行します。
///
/// 1. 拡張子で種別判定（ワークブック / CSV / 非対応）
/// 2. ワークブック: 全シート読み込み → バッチ計画 → バッチごとに
///    プロンプト構築・生成・解析・書き込み。2番目以降のバッチの前には
///    固定の待機を挿入する。
/// 3. バッチが失敗した場合はファイル全体を失敗させず、そのバッチの
///    シートを個別に再処理する（シート単位のエラーを記録）。
/// 4. CSV: 単一テーブル・単一テンプレート、バッチ化なし。
///
/// 予期されるどの失敗モードでもpanicせず、すべての失敗は構造化エラー
/// エントリとして`ConversionOutcome`に集約されます。
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetlm::ConverterBuilder;
///
/// # fn main() -> Result<(), sheetlm::SheetLmError> {
/// let converter = ConverterBuilder::new().with_api_key("key").build()?;
/// let outcome = converter.convert("input/report.xlsx", "output");
/// println!(
///     "{} files created, {} errors",
///     outcome.created_files.len(),
///     outcome.errors.len()
/// );
/// # Ok(())
/// # }
/// ```
pub struct Converter {
    /// 変換設定
    settings: ConversionSettings,

    /// プロンプトビルダー
    prompts: PromptBuilder,

    /// バッチプランナー
    planner: BatchPlanner,

    /// リトライ制御付き生成クライアント（ルールベースモードではNone）
    client: Option<GenerationClient>,
}

impl Converter {
    pub(crate) fn new(settings: ConversionSettings, client: Option<GenerationClient>) -> Self {
        let estimator = TokenEstimator::new(settings.avg_chars_per_token);
        let prompts = PromptBuilder::new(
            settings.additional_instructions.clone(),
            settings.row_limit,
        );
        let planner = BatchPlanner::new(
            settings.max_tokens_per_batch,
            settings.max_batch_size,
            estimator,
        );

        Self {
            settings,
            prompts,
            planner,
            client,
        }
    }

    /// ファイルまたはディレクトリを変換する
    ///
    /// ディレクトリの場合、直下の対応ファイル（`.xlsx` / `.xls` / `.csv`）を
    /// 名前順に処理します（再帰なし）。個々のファイルの失敗は記録された上で
    /// 処理は継続されます。
    ///
    /// # 戻り値
    ///
    /// 作成されたファイルのパスと構造化エラーを集約した`ConversionOutcome`。
    /// 部分的成功が正常系であり、この関数は失敗しません。
    pub fn convert(
        &self,
        input_path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> ConversionOutcome {
        let input_path = input_path.as_ref();
        let output_dir = output_dir.as_ref();

        if input_path.is_file() {
            return self.convert_file(input_path, output_dir);
        }

        let mut outcome = ConversionOutcome::new();

        // ディレクトリ直下の対応ファイルを列挙（再帰なし）
        let entries = match std::fs::read_dir(input_path) {
            Ok(entries) => entries,
            Err(e) => {
                outcome.push_error(
                    input_path.display().to_string(),
                    format!("Failed to read input directory: {}", e),
                );
                return outcome;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_supported_extension(path))
            .collect();
        files.sort();

        for file in files {
            // 個々のファイルの失敗は記録して継続する
            outcome.merge(self.convert_file(&file, output_dir));
        }

        outcome
    }

    /// 単一ファイルを変換する
    ///
    /// 予期される失敗（読み込み不能、非対応形式、リトライ枯渇など）は
    /// すべて構造化エラーエントリとして記録され、panicや`Err`にはなりません。
    pub fn convert_file(
        &self,
        path: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> ConversionOutcome {
        let path = path.as_ref();
        let output_dir = output_dir.as_ref();
        let mut outcome = ConversionOutcome::new();

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let base_name = sanitize_component(
            &path
                .file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string()),
        );

        tracing::info!(file = %path.display(), mode = ?self.settings.mode, "Converting file");

        // 1. 拡張子による種別判定
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match (extension.as_str(), self.settings.mode) {
            ("xlsx" | "xls", ConversionMode::Ai) => {
                self.convert_workbook_ai(path, output_dir, &file_name, &base_name, &mut outcome);
            }
            ("xlsx" | "xls", ConversionMode::Rules) => {
                self.convert_workbook_rules(path, output_dir, &file_name, &base_name, &mut outcome);
            }
            ("csv", ConversionMode::Ai) => {
                self.convert_csv_ai(path, output_dir, &file_name, &base_name, &mut outcome);
            }
            ("csv", ConversionMode::Rules) => {
                self.convert_csv_rules(path, output_dir, &file_name, &base_name, &mut outcome);
            }
            (other, _) => {
                outcome.push_error(
                    file_name.clone(),
                    if other.is_empty() {
                        "Unsupported file type: (no extension)".to_string()
                    } else {
                        format!("Unsupported file type: .{}", other)
                    },
                );
            }
        }

        outcome
    }

    // --- AIモード: ワークブック ---

    /// ワークブックをバッチ処理で変換する
    fn convert_workbook_ai(
        &self,
        path: &Path,
        output_dir: &Path,
        file_name: &str,
        base_name: &str,
        outcome: &mut ConversionOutcome,
    ) {
        // 1. 全シートの読み込み
        let tables = match reader::read_workbook(path) {
            Ok(tables) => tables,
            Err(e) => {
                // ファイル自体が読めない場合はファイル全体の致命的エラー
                outcome.push_error(file_name, format!("Failed to read workbook: {}", e));
                return;
            }
        };

        let Some(client) = self.client.as_ref() else {
            outcome.push_error(file_name, "AI client is not configured");
            return;
        };

        // 2. バッチ計画
        let estimator = TokenEstimator::new(self.settings.avg_chars_per_token);
        let overhead = self.prompts.instruction_overhead(&estimator);
        let batches = self.planner.plan(&tables, overhead);

        // 3. バッチごとの処理
        for (batch_idx, batch) in batches.iter().enumerate() {
            // 2番目以降のバッチの前にレート制限対策の待機を挿入
            if batch_idx > 0 {
                tracing::info!(
                    wait_secs = self.settings.batch_delay.as_secs_f64(),
                    "Waiting before processing next batch"
                );
                std::thread::sleep(self.settings.batch_delay);
            }

            let batch_tables: Vec<&Table> = batch.iter().map(|&i| &tables[i]).collect();
            let sheet_names: Vec<String> =
                batch_tables.iter().map(|t| t.name.clone()).collect();

            tracing::info!(
                batch = batch_idx + 1,
                total = batches.len(),
                sheets = ?sheet_names,
                "Processing batch"
            );

            match self.process_batch(
                client,
                &batch_tables,
                &sheet_names,
                output_dir,
                base_name,
                batch[0],
            ) {
                Ok(paths) => {
                    tracing::info!(
                        batch = batch_idx + 1,
                        files = paths.len(),
                        "Batch completed"
                    );
                    outcome.created_files.extend(paths);
                }
                Err(batch_error) => {
                    // バッチ失敗フォールバック: このバッチのシートを個別に処理する。
                    // 失敗時点で永続化済みのシート結果は存在しないため、
                    // バッチ全体を再処理する（部分的成功の検出は行わない）。
                    tracing::error!(
                        batch = batch_idx + 1,
                        error = %batch_error,
                        "Batch failed, falling back to per-sheet processing"
                    );

                    for (pos, &table_idx) in batch.iter().enumerate() {
                        if pos > 0 {
                            std::thread::sleep(self.settings.sheet_delay);
                        }

                        let table = &tables[table_idx];
                        tracing::info!(sheet = %table.name, "Processing sheet individually");

                        match self.convert_single_sheet(client, table, output_dir, base_name) {
                            Ok(paths) => outcome.created_files.extend(paths),
                            Err(sheet_error) => {
                                outcome.push_error(
                                    format!("{} - {}", file_name, table.name),
                                    self.friendly_message(&sheet_error.to_string()),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    /// 1バッチ分の生成・解析・書き込みを実行する
    fn process_batch(
        &self,
        client: &GenerationClient,
        batch_tables: &[&Table],
        sheet_names: &[String],
        output_dir: &Path,
        base_name: &str,
        first_index: usize,
    ) -> Result<Vec<PathBuf>, SheetLmError> {
        let payload = self.prompts.build_batch_prompt(batch_tables);
        let response_text = client.generate(&payload)?;

        // 解析は失敗しない（非構造化フォールバックあり）
        let fallback_stem = format!("{}_batch_{}", base_name, first_index);
        let files = response::parse(&response_text, sheet_names, base_name, &fallback_stem);

        materialize::write_files(&files, output_dir)
    }

    /// 1シートを単独で変換する（フォールバック経路）
    fn convert_single_sheet(
        &self,
        client: &GenerationClient,
        table: &Table,
        output_dir: &Path,
        base_name: &str,
    ) -> Result<Vec<PathBuf>, SheetLmError> {
        let payload = self.prompts.build_sheet_prompt(table);
        let response_text = client.generate(&payload)?;

        let stem = format!("{}_{}", base_name, sanitize_component(&table.name));
        let files = response::parse(&response_text, &[], base_name, &stem);

        materialize::write_files(&files, output_dir)
    }

    // --- AIモード: CSV ---

    /// CSVファイルを単一テーブルとして変換する
    fn convert_csv_ai(
        &self,
        path: &Path,
        output_dir: &Path,
        file_name: &str,
        base_name: &str,
        outcome: &mut ConversionOutcome,
    ) {
        let table = match reader::read_csv(path) {
            Ok(table) => table,
            Err(e) => {
                outcome.push_error(file_name, format!("Failed to read CSV file: {}", e));
                return;
            }
        };

        let Some(client) = self.client.as_ref() else {
            outcome.push_error(file_name, "AI client is not configured");
            return;
        };

        let payload = self.prompts.build_csv_prompt(&table, file_name);
        let response_text = match client.generate(&payload) {
            Ok(text) => text,
            Err(e) => {
                outcome.push_error(file_name, self.friendly_message(&e.to_string()));
                return;
            }
        };

        let files = response::parse(&response_text, &[], base_name, base_name);
        match materialize::write_files(&files, output_dir) {
            Ok(paths) => outcome.created_files.extend(paths),
            Err(e) => outcome.push_error(file_name, format!("Failed to write output: {}", e)),
        }
    }

    // --- ルールベースモード ---

    /// ワークブックを決定論的にMarkdownテーブルへ変換する
    ///
    /// 外部APIを使用しないため、シートの描画は並列化されます。
    /// 結果はインデックス順にソートされ、出力順は常に安定です。
    fn convert_workbook_rules(
        &self,
        path: &Path,
        output_dir: &Path,
        file_name: &str,
        base_name: &str,
        outcome: &mut ConversionOutcome,
    ) {
        let tables = match reader::read_workbook(path) {
            Ok(tables) => tables,
            Err(e) => {
                outcome.push_error(file_name, format!("Failed to read workbook: {}", e));
                return;
            }
        };

        // 各シートの描画を並列に計算し、インデックス順に整列
        let mut rendered: Vec<(usize, ParsedFile)> = tables
            .par_iter()
            .enumerate()
            .map(|(idx, table)| {
                let content = format!(
                    "# {}\n\n{}",
                    table.name,
                    render::table_to_markdown(&table.head(self.settings.row_limit))
                );
                let filename =
                    format!("{}_{}.md", base_name, sanitize_component(&table.name));
                (idx, ParsedFile { filename, content })
            })
            .collect();
        rendered.sort_by_key(|(idx, _)| *idx);

        let files: Vec<ParsedFile> = rendered.into_iter().map(|(_, file)| file).collect();
        match materialize::write_files(&files, output_dir) {
            Ok(paths) => outcome.created_files.extend(paths),
            Err(e) => outcome.push_error(file_name, format!("Failed to write output: {}", e)),
        }
    }

    /// CSVファイルを決定論的にMarkdownテーブルへ変換する
    fn convert_csv_rules(
        &self,
        path: &Path,
        output_dir: &Path,
        file_name: &str,
        base_name: &str,
        outcome: &mut ConversionOutcome,
    ) {
        let table = match reader::read_csv(path) {
            Ok(table) => table,
            Err(e) => {
                outcome.push_error(file_name, format!("Failed to read CSV file: {}", e));
                return;
            }
        };

        let content = format!(
            "# {}\n\n{}",
            table.name,
            render::table_to_markdown(&table.head(self.settings.row_limit))
        );
        let files = vec![ParsedFile {
            filename: format!("{}.md", base_name),
            content,
        }];

        match materialize::write_files(&files, output_dir) {
            Ok(paths) => outcome.created_files.extend(paths),
            Err(e) => outcome.push_error(file_name, format!("Failed to write output: {}", e)),
        }
    }

    /// 生のエラーメッセージを人間可読なメッセージに変換する
    fn friendly_message(&self, raw: &str) -> String {
        let lower = raw.to_lowercase();

        if raw.contains("API key not valid") {
            "The provided API key is not valid.".to_string()
        } else if lower.contains("quota") || raw.contains("429") {
            "Quota exceeded or requests were sent too quickly.".to_string()
        } else if lower.contains("not found") && lower.contains("model") {
            format!(
                "Model '{}' does not exist or is not supported.",
                self.settings.model
            )
        } else {
            raw.to_string()
        }
    }
}

/// 対応拡張子かどうかを判定
fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .map(|ext| matches!(ext.as_str(), "xlsx" | "xls" | "csv"))
        .unwrap_or(false)
}
