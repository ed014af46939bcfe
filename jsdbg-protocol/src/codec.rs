//! 分割送信と分割受信メッセージの再構築
//!
//! 送信側: 可変長ペイロードを最大メッセージサイズに収まるフレーム列に分割する。
//! 最初のフレームは `{T, 全体長:u32}` ヘッダ、以降のフレームは `{T+1}` ヘッダを持つ。
//!
//! 受信側: 型 `T` のフレームのペイロードを連結し、型 `T+1` のフレームで完了する。
//! 終端フレームは末尾にサブタイプ1バイトを持つことがある。

use crate::config::FIRST_FRAGMENT_HEADER;
use crate::{ClientMessageType, ProtocolError, Result, ServerMessageType, SessionConfig};

/// 継続フレームのヘッダ長（型のみ）
const PART_HEADER: usize = 1;

/// ペイロードを送信フレーム列に分割する
///
/// 返される各フレームは型バイトを先頭に含み、長さは最大メッセージサイズ以下です。
pub fn fragment(
    config: &SessionConfig,
    message_type: ClientMessageType,
    payload: &[u8],
) -> Vec<Vec<u8>> {
    let max = config.max_message_size;
    let first_len = payload.len().min(max - FIRST_FRAGMENT_HEADER);

    let mut first = Vec::with_capacity(FIRST_FRAGMENT_HEADER + first_len);
    first.push(message_type.as_u8());
    config.byte_order.write_u32(&mut first, payload.len() as u32);
    first.extend_from_slice(&payload[..first_len]);

    let mut frames = vec![first];

    // 継続フレームの型は常に基本型+1
    let part_type = message_type.as_u8() + 1;
    for chunk in payload[first_len..].chunks(max - PART_HEADER) {
        let mut frame = Vec::with_capacity(PART_HEADER + chunk.len());
        frame.push(part_type);
        frame.extend_from_slice(chunk);
        frames.push(frame);
    }

    frames
}

/// 再構築された論理メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembled {
    pub data: Vec<u8>,
    /// 終端フレームのサブタイプ
    pub subtype: Option<u8>,
}

/// 分割受信メッセージの再構築器
#[derive(Debug)]
pub struct Reassembler {
    base: u8,
    /// 終端フレームの型
    end: Option<u8>,
    with_subtype: bool,
    data: Vec<u8>,
}

impl Reassembler {
    /// 基本型 `base` のメッセージの再構築を開始する
    pub fn new(base: ServerMessageType, with_subtype: bool) -> Self {
        Self {
            base: base.as_u8(),
            end: base.end_type().map(ServerMessageType::as_u8),
            with_subtype,
            data: Vec::new(),
        }
    }

    /// フレームを1つ追加する
    ///
    /// 終端フレームを受け取ると完成したメッセージを返します。
    pub fn push(&mut self, frame: &[u8]) -> Result<Option<Assembled>> {
        let (&frame_type, payload) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;

        if frame_type == self.base {
            self.data.extend_from_slice(payload);
            return Ok(None);
        }

        if Some(frame_type) != self.end {
            return Err(ProtocolError::UnexpectedFrame {
                expected: self.base,
                found: frame_type,
            });
        }

        let mut data = std::mem::take(&mut self.data);
        if !self.with_subtype {
            data.extend_from_slice(payload);
            return Ok(Some(Assembled { data, subtype: None }));
        }

        let (&subtype, body) = payload.split_last().ok_or(ProtocolError::Truncated {
            message_type: frame_type,
            expected: 2,
            actual: frame.len(),
        })?;
        data.extend_from_slice(body);
        Ok(Some(Assembled {
            data,
            subtype: Some(subtype),
        }))
    }
}

/// 最初のフレームから始めて、`next` で後続フレームを取得しながら再構築する
///
/// 論理メッセージの途中で制御を返すとアキュムレータが壊れるため、`next` は
/// ブロッキング読み取りであることを前提とします。
pub fn reassemble<F, E>(
    base: ServerMessageType,
    with_subtype: bool,
    first: &[u8],
    mut next: F,
) -> std::result::Result<Assembled, E>
where
    F: FnMut() -> std::result::Result<Vec<u8>, E>,
    E: From<ProtocolError>,
{
    let mut reassembler = Reassembler::new(base, with_subtype);
    if let Some(done) = reassembler.push(first)? {
        return Ok(done);
    }
    loop {
        let frame = next()?;
        if let Some(done) = reassembler.push(&frame)? {
            return Ok(done);
        }
    }
}
