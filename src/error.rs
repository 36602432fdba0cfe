//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。

use thiserror::Error;

/// sheetlmクレート全体で使用するエラー型
///
/// このエラー型は、ファイルの読み込み、バッチ計画、AI生成、出力書き込みの
/// 各処理中に発生するすべてのエラーを統一的に扱うために使用されます。
///
/// # エラーの種類
///
/// - `Io`: I/O操作中に発生したエラー（ファイル読み込み失敗など）
/// - `Parse`: Excelファイルの解析中に発生したエラー（calamine由来）
/// - `Csv`: CSVファイルの解析中に発生したエラー（csvクレート由来）
/// - `Config`: 設定の検証に失敗したエラー（APIキー未設定など）
/// - `Generation`: AI生成リクエストが失敗したエラー（リトライ上限到達後）
///
/// # 使用例
///
/// ```rust,no_run
/// use sheetlm::SheetLmError;
/// use std::fs::File;
///
/// fn open_input(path: &str) -> Result<(), SheetLmError> {
///     let file = File::open(path)?;  // Ioエラーが自動的に変換される
///     // ... 処理 ...
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum SheetLmError {
    /// I/O操作中に発生したエラー
    ///
    /// ファイルの読み込み失敗、出力ディレクトリの作成失敗など、標準ライブラリの
    /// `std::io::Error`が発生した場合に使用されます。
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Excelファイルの解析中に発生したエラー
    ///
    /// calamineクレートがワークブックを解析する際に発生したエラーです。
    /// ファイル形式が不正、破損したファイル、サポートされていない形式などが
    /// 原因となります。
    #[error("Failed to parse workbook: {0}")]
    Parse(#[from] calamine::Error),

    /// CSVファイルの解析中に発生したエラー
    ///
    /// csvクレートがレコードを読み取る際に発生したエラーです。
    #[error("Failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    /// 設定の検証に失敗したエラー
    ///
    /// `ConverterBuilder::build()`時に設定を検証し、無効な設定が検出された
    /// 場合に発生します。例えば、AIモードでAPIキーが未設定の場合や、
    /// バッチサイズが0の場合などです。
    ///
    /// # 例
    ///
    /// ```rust
    /// use sheetlm::{ConverterBuilder, ConversionMode, SheetLmError};
    ///
    /// let result = ConverterBuilder::new()
    ///     .with_mode(ConversionMode::Ai)
    ///     .with_api_key("dummy-key")
    ///     .with_max_batch_size(0)  // 無効なバッチサイズ
    ///     .build();
    ///
    /// match result {
    ///     Err(SheetLmError::Config(msg)) => {
    ///         println!("設定エラー: {}", msg);
    ///     }
    ///     _ => {}
    /// }
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// AI生成リクエストが失敗したエラー
    ///
    /// 生成クライアントがリトライ上限に到達しても応答を得られなかった場合に
    /// 発生します。リトライ中の一時的なエラー（レート制限など）は呼び出し側に
    /// 見えず、このエラーは最後に観測されたエラーを保持します。
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// AI生成サービスとの通信で発生するエラー型
///
/// 1回のリクエスト試行が失敗した場合に使用されます。リトライ制御は
/// `GenerationClient`が担当し、このエラーの分類（レート制限か否か）に
/// 基づいて待機戦略を選択します。
#[derive(Error, Debug)]
pub enum GenerationError {
    /// HTTPトランスポート層のエラー
    ///
    /// 接続失敗、タイムアウト、TLSエラーなど、reqwest由来のエラーです。
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// APIがエラーステータスを返したエラー
    ///
    /// HTTPステータスコードとレスポンスボディを保持します。
    /// ステータス429はレート制限として分類されます。
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTPステータスコード
        status: u16,
        /// レスポンスボディ（エラー詳細）
        message: String,
    },

    /// レスポンスからテキストを抽出できなかったエラー
    ///
    /// 候補（candidates）が空、またはパートにテキストが含まれない場合に
    /// 発生します。
    #[error("Empty response from model")]
    EmptyResponse,
}
