//! ハンドシェイクとセッション設定
//!
//! 接続直後にターゲットから届く設定レコードを解析し、以降の整数デコードに使う
//! バイトオーダーとポインタ幅を決定します。再ネゴシエーションはありません。

use crate::{ProtocolError, Result, ServerMessageType};
use std::fmt;
use tracing::debug;

/// このクライアントが対応するプロトコルバージョン
pub const PROTOCOL_VERSION: u32 = 9;

/// 設定レコードのサイズ
///
/// type [1], flags [1], version [4], max_message_size [1], cpointer_size [1]
pub const CONFIG_SIZE: usize = 8;

/// flagsのリトルエンディアンビット
const LITTLE_ENDIAN_FLAG: u8 = 0x1;

/// 最初の分割フレームのヘッダ長（型 + 全体長）
pub const FIRST_FRAGMENT_HEADER: usize = 1 + 4;

/// バイトオーダー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// u16値をデコードする
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::Little => u16::from_le_bytes(bytes),
            ByteOrder::Big => u16::from_be_bytes(bytes),
        }
    }

    /// u32値をデコードする
    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    /// u16値をエンコードして追加する
    pub fn write_u16(self, out: &mut Vec<u8>, value: u16) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// u32値をエンコードして追加する
    pub fn write_u32(self, out: &mut Vec<u8>, value: u32) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&value.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&value.to_be_bytes()),
        }
    }
}

/// バイトコードハンドル（コンパクトポインタ）のサイズ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerSize {
    Two,
    Four,
}

impl PointerSize {
    /// バイト数から変換する
    pub fn from_u8(size: u8) -> Result<Self> {
        match size {
            2 => Ok(PointerSize::Two),
            4 => Ok(PointerSize::Four),
            other => Err(ProtocolError::BadPointerSize(other)),
        }
    }

    /// バイト数
    pub fn bytes(self) -> usize {
        match self {
            PointerSize::Two => 2,
            PointerSize::Four => 4,
        }
    }
}

/// リモートエンジンが割り当てた関数の識別子
///
/// クライアント側のポインタではなく、エンジンが決める不透明な値です。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteCodeHandle(pub u32);

impl fmt::Display for ByteCodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:#x}}}", self.0)
    }
}

/// ハンドシェイクで確定したセッション設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub byte_order: ByteOrder,
    pub pointer_size: PointerSize,
    /// 送信フレームのペイロード上限
    pub max_message_size: usize,
    pub version: u32,
}

impl SessionConfig {
    /// 設定レコードを解析する
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() != CONFIG_SIZE
            || record[0] != ServerMessageType::Configuration.as_u8()
        {
            return Err(ProtocolError::UnexpectedConfig);
        }

        let byte_order = if record[1] & LITTLE_ENDIAN_FLAG != 0 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        };

        // バージョンはネゴシエーション前に読めるよう、flagsのバイトオーダーで符号化されている
        let version = byte_order.read_u32([record[2], record[3], record[4], record[5]]);
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }

        let max_message_size = record[6];
        if (max_message_size as usize) <= FIRST_FRAGMENT_HEADER {
            return Err(ProtocolError::BadMaxMessageSize(max_message_size));
        }

        let pointer_size = PointerSize::from_u8(record[7])?;

        debug!(
            ?byte_order,
            pointer_size = pointer_size.bytes(),
            max_message_size,
            version,
            "handshake completed"
        );

        Ok(Self {
            byte_order,
            pointer_size,
            max_message_size: max_message_size as usize,
            version,
        })
    }

    /// ペイロードを読むためのリーダーを作成する
    pub fn reader<'a>(&self, message_type: u8, data: &'a [u8]) -> WireReader<'a> {
        WireReader {
            config: *self,
            message_type,
            data,
            pos: 0,
        }
    }

    /// バイトコードハンドルをエンコードして追加する
    pub fn write_handle(&self, out: &mut Vec<u8>, handle: ByteCodeHandle) {
        match self.pointer_size {
            // 2バイト幅のセッションではハンドルは常に16ビットに収まる
            PointerSize::Two => self.byte_order.write_u16(out, handle.0 as u16),
            PointerSize::Four => self.byte_order.write_u32(out, handle.0),
        }
    }

    /// バックトレース1フレーム分のレコード長（ハンドル + オフセット）
    pub fn frame_record_size(&self) -> usize {
        self.pointer_size.bytes() + 4
    }
}

/// セッション設定に従ってペイロードを読み進めるカーソル
pub struct WireReader<'a> {
    config: SessionConfig,
    message_type: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// 残りのバイト数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// 指定バイト数を切り出す
    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                message_type: self.message_type,
                expected: self.pos + len,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// u8値を読み取る
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// u32値を読み取る
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(self
            .config
            .byte_order
            .read_u32([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// バイトコードハンドルを読み取る
    pub fn read_handle(&mut self) -> Result<ByteCodeHandle> {
        match self.config.pointer_size {
            PointerSize::Two => {
                let bytes = self.take(2)?;
                Ok(ByteCodeHandle(
                    self.config.byte_order.read_u16([bytes[0], bytes[1]]) as u32,
                ))
            }
            PointerSize::Four => Ok(ByteCodeHandle(self.read_u32()?)),
        }
    }

    /// 残りを全て読み取る
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(flags: u8, version: u32, max: u8, cp: u8) -> Vec<u8> {
        let mut out = vec![ServerMessageType::Configuration.as_u8(), flags];
        if flags & LITTLE_ENDIAN_FLAG != 0 {
            out.extend_from_slice(&version.to_le_bytes());
        } else {
            out.extend_from_slice(&version.to_be_bytes());
        }
        out.push(max);
        out.push(cp);
        out
    }

    #[test]
    fn test_parse_little_endian() {
        let config = SessionConfig::parse(&record(1, PROTOCOL_VERSION, 128, 2)).unwrap();
        assert_eq!(config.byte_order, ByteOrder::Little);
        assert_eq!(config.pointer_size, PointerSize::Two);
        assert_eq!(config.max_message_size, 128);
        assert_eq!(config.version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_parse_big_endian_version() {
        let config = SessionConfig::parse(&record(0, PROTOCOL_VERSION, 64, 4)).unwrap();
        assert_eq!(config.byte_order, ByteOrder::Big);
        assert_eq!(config.pointer_size, PointerSize::Four);
    }

    #[test]
    fn test_parse_errors() {
        let mut bad_type = record(1, PROTOCOL_VERSION, 128, 2);
        bad_type[0] = ServerMessageType::ParseError.as_u8();
        assert_eq!(SessionConfig::parse(&bad_type), Err(ProtocolError::UnexpectedConfig));
        assert_eq!(SessionConfig::parse(&[1, 1, 0]), Err(ProtocolError::UnexpectedConfig));

        assert_eq!(
            SessionConfig::parse(&record(1, 8, 128, 2)),
            Err(ProtocolError::VersionMismatch {
                found: 8,
                expected: PROTOCOL_VERSION
            })
        );
        assert_eq!(
            SessionConfig::parse(&record(1, PROTOCOL_VERSION, 128, 8)),
            Err(ProtocolError::BadPointerSize(8))
        );
        assert_eq!(
            SessionConfig::parse(&record(1, PROTOCOL_VERSION, 5, 2)),
            Err(ProtocolError::BadMaxMessageSize(5))
        );
    }

    #[test]
    fn test_reader_uses_negotiated_layout() {
        let config = SessionConfig::parse(&record(0, PROTOCOL_VERSION, 64, 2)).unwrap();
        let data = [0x12, 0x34, 0x00, 0x00, 0x01, 0x00];
        let mut reader = config.reader(16, &data);
        assert_eq!(reader.read_handle().unwrap(), ByteCodeHandle(0x1234));
        assert_eq!(reader.read_u32().unwrap(), 0x100);
        assert!(reader.read_u8().is_err());
    }
}
