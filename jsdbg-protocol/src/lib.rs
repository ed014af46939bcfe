//! jsdbg ワイヤプロトコル
//!
//! このクレートは、組み込みJavaScriptエンジンのリモートデバッグプロトコルの
//! 低レベル部分を提供します。ハンドシェイクの解析、メッセージ型の定義、
//! 分割送信と分割受信の再構築、フレームを受け渡すチャネルのインターフェースなどです。

pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod server;

pub use channel::{Channel, Incoming};
pub use client::ClientMessage;
pub use codec::{fragment, reassemble, Assembled, Reassembler};
pub use config::{
    ByteCodeHandle, ByteOrder, PointerSize, SessionConfig, WireReader, CONFIG_SIZE,
    PROTOCOL_VERSION,
};
pub use error::ProtocolError;
pub use message::{
    ClientMessageType, EvalKind, EvalSubtype, OutputSubtype, ScopeKind, ServerMessageType,
    ValueType,
};
pub use server::{decode_positions, CodePosition, MemStats, ServerMessage};

/// プロトコル処理の結果型
pub type Result<T> = std::result::Result<T, ProtocolError>;
