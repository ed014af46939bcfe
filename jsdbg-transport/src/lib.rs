//! jsdbg トランスポート
//!
//! このクレートは、デバッグ対象のエンジンとの接続を提供します。
//! バイト列を送受信するプロトコル層（TCPソケット）と、その上でフレームの境界を
//! 決めるチャネル層（生パケット、WebSocket）の2層からなります。チャネル層は
//! [`jsdbg_protocol::Channel`] を実装します。

pub mod error;
pub mod protocol;
pub mod raw_packet;
pub mod websocket;

pub use error::TransportError;
pub use protocol::{TcpProtocol, Transport};
pub use raw_packet::RawPacket;
pub use websocket::WebSocket;

/// 1回の受信で読み取る最大バイト数
pub const MAX_BUFFER_SIZE: usize = 128;

#[cfg(test)]
pub(crate) mod testing;
