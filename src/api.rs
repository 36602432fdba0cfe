//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

/// 変換モード
///
/// 表データをMarkdownに変換する方式を指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConversionMode {
    /// AI変換（デフォルト）
    ///
    /// シート内容を生成AIに送信し、構造を解釈したMarkdownを受け取ります。
    /// 複数シートはトークン予算に基づいてバッチ化されます。
    ///
    /// # 利点
    ///
    /// - レイアウト目的のテーブルを見出し・リストに再構成できる
    /// - データテーブルとレイアウトテーブルを区別できる
    ///
    /// # 注意
    ///
    /// APIキーが必要です。外部サービスのレート制限に従うため、バッチ間に
    /// 意図的な待機が挿入されます。
    Ai,

    /// ルールベース変換
    ///
    /// AIを使用せず、各シートを決定論的にMarkdownテーブルとして出力します。
    /// ネットワークアクセスは発生しません。
    ///
    /// # 出力例
    ///
    /// ```markdown
    /// | Header1 | Header2 |
    /// | ------- | ------- |
    /// | Data1   | Data2   |
    /// ```
    Rules,
}
