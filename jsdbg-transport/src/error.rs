//! トランスポートエラー

use std::io;
use thiserror::Error;

/// チャネル層のフレーミング違反
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// WebSocketのハンドシェイク応答が不正
    #[error("unexpected handshake")]
    UnexpectedHandshake,

    /// 設定メッセージのフレームが不正
    #[error("unexpected configuration")]
    UnexpectedConfiguration,

    /// データフレームのヘッダが不正
    #[error("unexpected data frame (header byte {0:#04x})")]
    UnexpectedFrame(u8),

    /// 1フレームに収まらないペイロード
    #[error("message of {0} bytes is too large for a single frame")]
    MessageTooLarge(usize),

    /// 接続前の操作
    #[error("not connected")]
    NotConnected,
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        let kind = match err {
            TransportError::NotConnected => io::ErrorKind::NotConnected,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}
