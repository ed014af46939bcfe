//! テスト用のメモリ上のトランスポート

use crate::Transport;
use std::collections::VecDeque;
use std::io;

/// 受信データを塊単位で積み、送信データを記録する
#[derive(Debug, Default)]
pub struct MemoryTransport {
    pub incoming: VecDeque<Vec<u8>>,
    pub sent: Vec<u8>,
    pub connected: bool,
}

impl MemoryTransport {
    pub fn with_chunks(chunks: &[&[u8]]) -> Self {
        Self {
            incoming: chunks.iter().map(|chunk| chunk.to_vec()).collect(),
            ..Self::default()
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> io::Result<()> {
        self.connected = true;
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> io::Result<usize> {
        // 部分送信を再現するため、一度に最大4バイトだけ受け付ける
        let n = data.len().min(4);
        self.sent.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn receive_data(&mut self, max_size: usize) -> io::Result<Vec<u8>> {
        let Some(mut chunk) = self.incoming.pop_front() else {
            return Ok(Vec::new());
        };
        if chunk.len() > max_size {
            let rest = chunk.split_off(max_size);
            self.incoming.push_front(rest);
        }
        Ok(chunk)
    }

    fn ready(&mut self) -> io::Result<bool> {
        Ok(!self.incoming.is_empty())
    }

    fn close(&mut self) -> io::Result<()> {
        self.connected = false;
        Ok(())
    }
}
