//! WebSocketチャネル
//!
//! HTTPのアップグレード要求でハンドシェイクし、以降は1フレーム1メッセージの
//! バイナリフレームでやり取りします。サーバからのフレームはマスクなし、
//! クライアントからのフレームは全てゼロのマスクを付けます。

use crate::{Transport, TransportError, MAX_BUFFER_SIZE};
use jsdbg_protocol::{ByteOrder, Channel, Incoming};
use std::io;
use tracing::debug;

const BINARY_FRAME: u8 = 0x02;
const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
/// 7ビット長で表せる最大のペイロード長
const MAX_SHORT_LENGTH: usize = 125;

const HANDSHAKE_REQUEST: &[u8] = b"GET /jerry-debugger HTTP/1.1\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Key: bc0gGqHQEuFb4NBIV8Q1cQ==\r\n\r\n";

const HANDSHAKE_RESPONSE: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\
Upgrade: websocket\r\n\
Connection: Upgrade\r\n\
Sec-WebSocket-Accept: ";

const HEADER_END: &[u8] = b"\r\n\r\n";

/// WebSocketのバイナリフレームでメッセージを区切るチャネル
pub struct WebSocket<T: Transport> {
    transport: T,
    /// 受信済みで未処理のバイト列。Noneなら接続が閉じられた
    buffer: Option<Vec<u8>>,
}

impl<T: Transport> WebSocket<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Some(Vec::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn buffer_mut(&mut self) -> io::Result<&mut Vec<u8>> {
        self.buffer
            .as_mut()
            .ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }

    /// 1回受信してバッファに追加する
    fn receive_more(&mut self) -> io::Result<()> {
        let data = self.transport.receive_data(MAX_BUFFER_SIZE)?;
        if data.is_empty() {
            self.buffer = None;
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.buffer_mut()?.extend_from_slice(&data);
        Ok(())
    }

    fn handshake(&mut self) -> io::Result<()> {
        self.transport.send_all(HANDSHAKE_REQUEST)?;

        while self.buffer_mut()?.len() < HANDSHAKE_RESPONSE.len() {
            self.receive_more()?;
        }
        if !self.buffer_mut()?.starts_with(HANDSHAKE_RESPONSE) {
            return Err(TransportError::UnexpectedHandshake.into());
        }

        let end = loop {
            if let Some(pos) = find(self.buffer_mut()?, HEADER_END) {
                break pos + HEADER_END.len();
            }
            self.receive_more()?;
        };
        self.buffer_mut()?.drain(..end);
        debug!("websocket handshake completed");
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

impl<T: Transport> Channel for WebSocket<T> {
    fn connect(&mut self, config_size: usize) -> io::Result<Vec<u8>> {
        self.transport.connect()?;
        self.buffer = Some(Vec::new());
        self.handshake()?;

        // 設定メッセージ: オペコード[1] + 長さ[1] + 設定[config_size]
        let expected = config_size + 2;
        while self.buffer_mut()?.len() < expected {
            self.receive_more()?;
        }
        let buffer = self.buffer_mut()?;
        if buffer[0] != FIN_BIT | BINARY_FRAME || buffer[1] as usize != config_size {
            return Err(TransportError::UnexpectedConfiguration.into());
        }
        let config = buffer[2..expected].to_vec();
        buffer.drain(..expected);
        Ok(config)
    }

    fn send_message(&mut self, _byte_order: ByteOrder, payload: &[u8]) -> io::Result<()> {
        if payload.len() > MAX_SHORT_LENGTH {
            return Err(TransportError::MessageTooLarge(payload.len()).into());
        }
        let mut frame = Vec::with_capacity(payload.len() + 6);
        frame.push(FIN_BIT | BINARY_FRAME);
        frame.push(MASK_BIT | payload.len() as u8);
        // ゼロのマスクなのでペイロードはそのまま
        frame.extend_from_slice(&[0, 0, 0, 0]);
        frame.extend_from_slice(payload);
        self.transport.send_all(&frame)
    }

    fn get_message(&mut self, blocking: bool) -> io::Result<Incoming> {
        loop {
            let Some(buffer) = self.buffer.as_mut() else {
                return Ok(Incoming::Eof);
            };

            if buffer.len() >= 2 {
                if buffer[0] != FIN_BIT | BINARY_FRAME {
                    return Err(TransportError::UnexpectedFrame(buffer[0]).into());
                }
                let size = buffer[1] as usize;
                if size == 0 || size > MAX_SHORT_LENGTH {
                    return Err(TransportError::UnexpectedFrame(buffer[1]).into());
                }
                if buffer.len() >= size + 2 {
                    let message = buffer[2..size + 2].to_vec();
                    buffer.drain(..size + 2);
                    return Ok(Incoming::Message(message));
                }
            }

            if !blocking && !self.transport.ready()? {
                return Ok(Incoming::Empty);
            }

            let data = self.transport.receive_data(MAX_BUFFER_SIZE)?;
            if data.is_empty() {
                self.buffer = None;
                return Ok(Incoming::Eof);
            }
            buffer.extend_from_slice(&data);
        }
    }

    fn close(&mut self) -> io::Result<()> {
        self.buffer = None;
        self.transport.close()
    }
}
