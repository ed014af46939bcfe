//! プロトコルエラー

use thiserror::Error;

/// プロトコル違反
///
/// どのバリアントもセッションにとって致命的です。受信途中のアキュムレータの
/// 状態が信用できなくなるため、部分的な復旧は行いません。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 設定メッセージの型やサイズが不正
    #[error("unexpected configuration message")]
    UnexpectedConfig,

    /// ターゲットのプロトコルバージョンが一致しない
    #[error("incorrect debugger version from target: {found} expected: {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// コンパクトポインタのサイズが2でも4でもない
    #[error("unsupported byte code pointer size: {0}")]
    BadPointerSize(u8),

    /// 最大メッセージサイズが分割送信できないほど小さい
    #[error("maximum message size {0} is too small")]
    BadMaxMessageSize(u8),

    /// 論理メッセージの再構築中に別種のフレームが届いた
    #[error("unexpected frame type {found} while receiving message type {expected}")]
    UnexpectedFrame { expected: u8, found: u8 },

    /// 未知のメッセージ型
    #[error("unknown message type {0}")]
    UnknownMessage(u8),

    /// 現在の状態では受け付けられないメッセージ
    #[error("unexpected message type {0}")]
    UnexpectedMessage(u8),

    /// 空のフレーム
    #[error("empty frame received")]
    EmptyFrame,

    /// フレームのペイロードが短すぎる
    #[error("truncated message type {message_type}: expected {expected} bytes, got {actual}")]
    Truncated {
        message_type: u8,
        expected: usize,
        actual: usize,
    },

    /// 登録されていないバイトコードハンドル
    #[error("unknown byte code handle {{{0:#x}}}")]
    UnknownHandle(u32),

    /// ブレークポイントを一つも持たない関数
    #[error("function {{{0:#x}}} has no breakpoint information")]
    MissingBreakpoints(u32),

    /// 行テーブルとオフセットテーブルの長さが一致しない
    #[error("function {{{handle:#x}}} has {lines} breakpoint lines but {offsets} offsets")]
    BreakpointTableMismatch {
        handle: u32,
        lines: usize,
        offsets: usize,
    },

    /// スコープチェーンの不正な要素
    #[error("unexpected scope chain element {0}")]
    BadScopeKind(u8),

    /// 不正なサブタイプ
    #[error("unexpected subtype {subtype} for message type {message_type}")]
    BadSubtype { message_type: u8, subtype: u8 },
}
