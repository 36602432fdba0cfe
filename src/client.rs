//! Generation Client Module
//!
//! 外部AI生成サービスへのリクエスト送信を担当するモジュール。
//! 1回の試行を表す`GenerationBackend`トレイトと、リトライ・バックオフ制御を
//! 行う`GenerationClient`を分離して実装する。
//!
//! # リトライ状態機械
//!
//! 失敗は2種類に分類され、それぞれ異なる待機規則で遷移します。
//!
//! - レート制限（HTTP 429、またはメッセージに`quota`を含む）:
//!   サーバー提示の待機時間（`retry in <秒>s`）があればその値＋バッファ秒を
//!   待機する。提示がなければ指数バックオフにフォールスルーする。
//! - その他の一時エラー: `initial_delay * 2^(attempt-1)`の指数バックオフ。
//!
//! どちらの場合も試行回数は1増え、上限`max_retries`に到達した時点で
//! 最後に観測されたエラーがそのまま致命的エラーとして返されます。

use regex::Regex;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::GenerationError;

/// Gemini APIのベースURL
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 1回の生成リクエスト試行を表すトレイト
///
/// リトライ制御は`GenerationClient`の責務であり、実装はネットワーク呼び出し
/// 1回分のみを担当します。テストではスクリプト化されたモック実装を
/// 注入できます。
///
/// # 使用例
///
/// ```rust
/// use sheetlm::{GenerationBackend, GenerationError};
///
/// struct EchoBackend;
///
/// impl GenerationBackend for EchoBackend {
///     fn generate(&self, payload: &str) -> Result<String, GenerationError> {
///         Ok(format!("echo: {}", payload.len()))
///     }
/// }
/// ```
pub trait GenerationBackend: Send + Sync {
    /// ペイロードを送信し、生のレスポンステキストを返す
    fn generate(&self, payload: &str) -> Result<String, GenerationError>;
}

/// Gemini REST APIのバックエンド実装
///
/// `generateContent`エンドポイントにブロッキングHTTPで送信し、レスポンスを
/// 単一のJSON値として返すよう要求します（`response_mime_type`）。
pub struct GeminiClient {
    /// ブロッキングHTTPクライアント
    http: reqwest::blocking::Client,

    /// APIキー（構築時に解決済み、以降の暗黙的な参照なし）
    api_key: String,

    /// モデル識別子（例: `gemini-2.5-flash`）
    model: String,
}

impl GeminiClient {
    /// 新しいGeminiクライアントを生成
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// 利用可能なモデル名の一覧を取得
    ///
    /// 名前は`models/`プレフィックスを除去し、ソートして返します。
    ///
    /// # 引数
    ///
    /// * `api_key` - Gemini APIキー
    pub fn list_models(api_key: &str) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/models?key={}", API_BASE_URL, api_key);
        let response = reqwest::blocking::Client::new().get(&url).send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value = response.json()?;
        let mut models: Vec<String> = value["models"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|m| m["name"].as_str())
                    .map(|name| name.trim_start_matches("models/").to_string())
                    .collect()
            })
            .unwrap_or_default();
        models.sort();

        Ok(models)
    }
}

impl GenerationBackend for GeminiClient {
    fn generate(&self, payload: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE_URL, self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [{ "text": payload }]
            }],
            "generationConfig": {
                "response_mime_type": "application/json"
            }
        });

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value = response.json()?;
        extract_response_text(&value)
    }
}

/// レスポンスJSONから生成テキストを抽出
///
/// 先頭候補のすべてのパートのテキストを改行で連結します。
fn extract_response_text(value: &serde_json::Value) -> Result<String, GenerationError> {
    let parts: Vec<&str> = value["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|list| list.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if parts.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    Ok(parts.join("\n"))
}

/// 失敗の分類結果
///
/// リトライ状態機械の遷移規則はこの分類のみに依存します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ErrorClass {
    /// レート制限。サーバーが待機時間を提示した場合はその値を保持する。
    RateLimited { server_hint: Option<Duration> },

    /// その他の一時エラー（指数バックオフ対象）
    Transient,
}

/// エラーを分類する
///
/// HTTPステータス429、またはエラーメッセージに`quota`（大文字小文字不問）を
/// 含む場合はレート制限として扱います。
pub(crate) fn classify(error: &GenerationError) -> ErrorClass {
    let (status, message) = match error {
        GenerationError::Api { status, message } => (Some(*status), message.as_str()),
        GenerationError::Transport(e) => {
            return if e.status().map(|s| s.as_u16()) == Some(429) {
                ErrorClass::RateLimited { server_hint: None }
            } else {
                ErrorClass::Transient
            };
        }
        GenerationError::EmptyResponse => (None, ""),
    };

    if status == Some(429) || message.to_lowercase().contains("quota") {
        ErrorClass::RateLimited {
            server_hint: extract_retry_hint(message),
        }
    } else {
        ErrorClass::Transient
    }
}

/// エラーメッセージからサーバー提示の待機時間を抽出
///
/// パターン例: `Please retry in 24.77550335s.` / `retry in 30s`
fn extract_retry_hint(message: &str) -> Option<Duration> {
    static HINT_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = HINT_PATTERN
        .get_or_init(|| Regex::new(r"retry in (\d+(?:\.\d+)?)s").expect("valid hint pattern"));

    pattern
        .captures(message)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()
        .map(Duration::from_secs_f64)
}

/// リトライ待機規則
///
/// 遷移規則は純粋関数`delay_after_failure`として実装され、単体テストで
/// 実時間の待機なしに検証できます。
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    /// 試行回数の上限
    pub max_retries: u32,

    /// 指数バックオフの初期待機時間
    pub initial_delay: Duration,

    /// サーバー提示待機時間に加算するバッファ
    pub hint_buffer: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(10),
            hint_buffer: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    /// `attempt`回目の失敗後の待機時間を計算
    ///
    /// # 引数
    ///
    /// * `attempt` - これまでの失敗回数（1始まり）
    /// * `class` - 直前のエラーの分類
    pub fn delay_after_failure(&self, attempt: u32, class: &ErrorClass) -> Duration {
        if let ErrorClass::RateLimited {
            server_hint: Some(hint),
        } = class
        {
            // サーバー提示の待機: 指数バックオフのステップは消費しない
            return *hint + self.hint_buffer;
        }

        // 指数バックオフ: initial_delay * 2^(attempt-1)
        self.initial_delay * 2u32.pow(attempt.saturating_sub(1))
    }
}

/// リトライ制御付きの生成クライアント
///
/// バックエンドへの試行が失敗するたびにエラーを分類し、待機規則に従って
/// スリープしてから再試行します。上限到達後は最後のエラーをそのまま
/// 返します。単一テーブル用・バッチ用のどちらのペイロードでも動作は
/// 同一です。
pub(crate) struct GenerationClient {
    /// 1試行分のバックエンド
    backend: Box<dyn GenerationBackend>,

    /// リトライ待機規則
    policy: RetryPolicy,
}

impl GenerationClient {
    /// 新しいクライアントを生成
    pub fn new(backend: Box<dyn GenerationBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// ペイロードを送信し、レスポンステキストを返す
    ///
    /// # 戻り値
    ///
    /// * `Ok(String)` - いずれかの試行が成功した場合のレスポンステキスト
    /// * `Err(GenerationError)` - 全試行が失敗した場合、最後に観測された
    ///   エラー
    ///
    /// # 副作用
    ///
    /// 各試行はブロッキングのネットワーク呼び出しであり、リトライごとに
    /// 呼び出しスレッドをスリープさせます。同一リクエストの並行リトライは
    /// 行いません。
    pub fn generate(&self, payload: &str) -> Result<String, GenerationError> {
        let mut attempt: u32 = 0;

        loop {
            match self.backend.generate(payload) {
                Ok(text) => return Ok(text),
                Err(error) => {
                    attempt += 1;

                    if attempt >= self.policy.max_retries {
                        tracing::error!(
                            attempts = attempt,
                            error = %error,
                            "Generation failed after exhausting retries"
                        );
                        return Err(error);
                    }

                    let class = classify(&error);
                    let delay = self.policy.delay_after_failure(attempt, &class);

                    match &class {
                        ErrorClass::RateLimited {
                            server_hint: Some(_),
                        } => {
                            tracing::warn!(
                                wait_secs = delay.as_secs_f64(),
                                "Rate limited, honoring server-suggested wait"
                            );
                        }
                        _ => {
                            tracing::info!(
                                attempt = attempt + 1,
                                max_retries = self.policy.max_retries,
                                wait_secs = delay.as_secs_f64(),
                                "Retrying generation request"
                            );
                        }
                    }

                    std::thread::sleep(delay);
                }
            }
        }
    }
}
