//! デバッガのエラー分類

use jsdbg_protocol::ProtocolError;
use thiserror::Error;

/// デバッガのエラー
#[derive(Debug, Error)]
pub enum DebuggerError {
    /// 不正なフレームや順序違反。セッションを終了する
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// ターゲットが報告した構文エラー。現在のパース単位だけを破棄する
    #[error("syntax error found in the parsed source")]
    Parse,

    /// 不正なユーザー入力。状態は変更されない
    #[error("{0}")]
    UserInput(String),

    /// トランスポートの切断
    #[error("connection closed")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl DebuggerError {
    /// ユーザー入力エラーを作成する
    pub fn user(message: impl Into<String>) -> Self {
        DebuggerError::UserInput(message.into())
    }

    /// セッションを続行できないエラーかどうか
    pub fn is_fatal(&self) -> bool {
        match self {
            DebuggerError::Protocol(_) | DebuggerError::ConnectionClosed | DebuggerError::Io(_) => {
                true
            }
            DebuggerError::Parse | DebuggerError::UserInput(_) => false,
        }
    }
}
