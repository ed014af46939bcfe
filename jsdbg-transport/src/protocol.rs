//! プロトコル層（バイト列の送受信）

use crate::TransportError;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use tracing::debug;

/// バイト列を送受信する接続
pub trait Transport {
    /// 接続する
    fn connect(&mut self) -> io::Result<()>;

    /// データを送信し、実際に送れたバイト数を返す
    fn send_data(&mut self, data: &[u8]) -> io::Result<usize>;

    /// 最大 `max_size` バイトをブロッキングで受信する。空なら接続が閉じられた
    fn receive_data(&mut self, max_size: usize) -> io::Result<Vec<u8>>;

    /// ブロックせずに受信できるデータ（または切断）があるか
    fn ready(&mut self) -> io::Result<bool>;

    /// 接続を閉じる
    fn close(&mut self) -> io::Result<()>;

    /// 全てのデータを送信する
    fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut sent = 0;
        while sent < data.len() {
            let n = self.send_data(&data[sent..])?;
            if n == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            sent += n;
        }
        Ok(())
    }
}

/// TCPソケット
pub struct TcpProtocol {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpProtocol {
    /// `host:port` 形式のアドレス。ポートを省略すると5001
    pub fn new(address: &str) -> Self {
        let has_port = address
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        let address = if has_port {
            address.to_string()
        } else {
            format!("{}:5001", address)
        };
        Self {
            address,
            stream: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::NotConnected.into())
    }
}

impl Transport for TcpProtocol {
    fn connect(&mut self) -> io::Result<()> {
        debug!("connecting to {}", self.address);
        let stream = TcpStream::connect(&self.address)?;
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn send_data(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream()?.write(data)
    }

    fn receive_data(&mut self, max_size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; max_size];
        let n = self.stream()?.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn ready(&mut self) -> io::Result<bool> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let result = match stream.peek(&mut [0u8; 1]) {
            // 0バイトは切断。次の受信で検出させる
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        };
        stream.set_nonblocking(false)?;
        result
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(stream) = self.stream.take() {
            debug!("closing connection to {}", self.address);
            match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}
