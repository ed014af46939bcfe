//! 生パケットチャネル
//!
//! 各フレームは1バイトの長さプレフィックスとペイロードです。

use crate::{Transport, TransportError, MAX_BUFFER_SIZE};
use jsdbg_protocol::{ByteOrder, Channel, Incoming};
use std::io;
use tracing::debug;

/// 長さプレフィックスでフレームを区切るチャネル
pub struct RawPacket<T: Transport> {
    transport: T,
    /// 受信済みで未処理のバイト列。Noneなら接続が閉じられた
    buffer: Option<Vec<u8>>,
}

impl<T: Transport> RawPacket<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Some(Vec::new()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// バッファに少なくとも `len` バイト溜まるまで受信する
    fn fill(&mut self, len: usize) -> io::Result<()> {
        loop {
            let buffer = self.buffer.as_mut().ok_or(io::ErrorKind::UnexpectedEof)?;
            if buffer.len() >= len {
                return Ok(());
            }
            let data = self.transport.receive_data(MAX_BUFFER_SIZE)?;
            if data.is_empty() {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            buffer.extend_from_slice(&data);
        }
    }
}

impl<T: Transport> Channel for RawPacket<T> {
    fn connect(&mut self, config_size: usize) -> io::Result<Vec<u8>> {
        self.transport.connect()?;
        self.buffer = Some(Vec::new());

        // 設定メッセージ: 長さ[1] + 設定[config_size]
        let expected = config_size + 1;
        self.fill(expected)?;
        let buffer = self.buffer.as_mut().ok_or(io::ErrorKind::UnexpectedEof)?;
        if buffer[0] as usize != config_size {
            return Err(TransportError::UnexpectedConfiguration.into());
        }
        let config = buffer[1..expected].to_vec();
        buffer.drain(..expected);
        debug!("raw packet channel connected");
        Ok(config)
    }

    fn send_message(&mut self, _byte_order: ByteOrder, payload: &[u8]) -> io::Result<()> {
        let len = u8::try_from(payload.len())
            .map_err(|_| TransportError::MessageTooLarge(payload.len()))?;
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(len);
        frame.extend_from_slice(payload);
        self.transport.send_all(&frame)
    }

    fn get_message(&mut self, blocking: bool) -> io::Result<Incoming> {
        loop {
            let Some(buffer) = self.buffer.as_mut() else {
                return Ok(Incoming::Eof);
            };

            if let Some(&size) = buffer.first() {
                if size == 0 {
                    return Err(TransportError::UnexpectedFrame(size).into());
                }
                let size = size as usize;
                if buffer.len() > size {
                    let message = buffer[1..=size].to_vec();
                    buffer.drain(..=size);
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
