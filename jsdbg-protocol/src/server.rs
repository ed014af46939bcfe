//! サーバ（ターゲット）からのメッセージのデコード

use crate::{ByteCodeHandle, ProtocolError, Result, ServerMessageType, SessionConfig};

/// バイトコード内の位置（ブレークポイントヒットやバックトレースの1フレーム）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodePosition {
    pub handle: ByteCodeHandle,
    pub offset: u32,
}

/// メモリ統計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemStats {
    pub allocated_bytes: u32,
    pub byte_code_bytes: u32,
    pub string_bytes: u32,
    pub object_bytes: u32,
    pub property_bytes: u32,
}

/// デコード済みのサーバメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    ParseError,
    ByteCodeCp(ByteCodeHandle),
    ParseFunction { line: u32, column: u32 },
    BreakpointLines(Vec<u32>),
    BreakpointOffsets(Vec<u32>),
    SourceCode { data: Vec<u8>, end: bool },
    SourceCodeName { data: Vec<u8>, end: bool },
    FunctionName { data: Vec<u8>, end: bool },
    WaitingAfterParse,
    ReleaseByteCodeCp(ByteCodeHandle),
    Memstats(MemStats),
    BreakpointHit(CodePosition),
    ExceptionHit(CodePosition),
    ExceptionStr { data: Vec<u8>, end: bool },
    BacktraceTotal(u32),
    /// 分割された論理メッセージの最初のフレーム
    ///
    /// 本体は [`crate::codec::reassemble`] で組み立てます。値は基本型です。
    Multipart(ServerMessageType),
    WaitForSource,
    CloseConnection,
}

impl ServerMessage {
    /// フレームをデコードする
    pub fn decode(config: &SessionConfig, frame: &[u8]) -> Result<Self> {
        let (&raw_type, payload) = frame.split_first().ok_or(ProtocolError::EmptyFrame)?;
        let message_type =
            ServerMessageType::from_u8(raw_type).ok_or(ProtocolError::UnknownMessage(raw_type))?;
        let mut reader = config.reader(raw_type, payload);

        use ServerMessageType as T;
        let message = match message_type {
            T::Configuration => return Err(ProtocolError::UnexpectedMessage(raw_type)),
            T::ParseError => ServerMessage::ParseError,
            T::ByteCodeCp => ServerMessage::ByteCodeCp(reader.read_handle()?),
            T::ParseFunction => ServerMessage::ParseFunction {
                line: reader.read_u32()?,
                column: reader.read_u32()?,
            },
            T::BreakpointList => {
                ServerMessage::BreakpointLines(decode_u32_list(config, raw_type, payload)?)
            }
            T::BreakpointOffsetList => {
                ServerMessage::BreakpointOffsets(decode_u32_list(config, raw_type, payload)?)
            }
            T::SourceCode | T::SourceCodeEnd => ServerMessage::SourceCode {
                data: payload.to_vec(),
                end: message_type == T::SourceCodeEnd,
            },
            T::SourceCodeName | T::SourceCodeNameEnd => ServerMessage::SourceCodeName {
                data: payload.to_vec(),
                end: message_type == T::SourceCodeNameEnd,
            },
            T::FunctionName | T::FunctionNameEnd => ServerMessage::FunctionName {
                data: payload.to_vec(),
                end: message_type == T::FunctionNameEnd,
            },
            T::WaitingAfterParse => ServerMessage::WaitingAfterParse,
            T::ReleaseByteCodeCp => ServerMessage::ReleaseByteCodeCp(reader.read_handle()?),
            T::MemstatsReceive => ServerMessage::Memstats(MemStats {
                allocated_bytes: reader.read_u32()?,
                byte_code_bytes: reader.read_u32()?,
                string_bytes: reader.read_u32()?,
                object_bytes: reader.read_u32()?,
                property_bytes: reader.read_u32()?,
            }),
            T::BreakpointHit => ServerMessage::BreakpointHit(CodePosition {
                handle: reader.read_handle()?,
                offset: reader.read_u32()?,
            }),
            T::ExceptionHit => ServerMessage::ExceptionHit(CodePosition {
                handle: reader.read_handle()?,
                offset: reader.read_u32()?,
            }),
            T::ExceptionStr | T::ExceptionStrEnd => ServerMessage::ExceptionStr {
                data: payload.to_vec(),
                end: message_type == T::ExceptionStrEnd,
            },
            T::BacktraceTotal => ServerMessage::BacktraceTotal(reader.read_u32()?),
            T::Backtrace | T::BacktraceEnd => ServerMessage::Multipart(T::Backtrace),
            T::EvalResult | T::EvalResultEnd => ServerMessage::Multipart(T::EvalResult),
            T::OutputResult | T::OutputResultEnd => ServerMessage::Multipart(T::OutputResult),
            T::ScopeChain | T::ScopeChainEnd => ServerMessage::Multipart(T::ScopeChain),
            T::ScopeVariables | T::ScopeVariablesEnd => ServerMessage::Multipart(T::ScopeVariables),
            T::WaitForSource => ServerMessage::WaitForSource,
            T::CloseConnection => ServerMessage::CloseConnection,
        };

        Ok(message)
    }
}

/// u32値の並びをデコードする
fn decode_u32_list(config: &SessionConfig, message_type: u8, payload: &[u8]) -> Result<Vec<u32>> {
    if payload.len() % 4 != 0 {
        return Err(ProtocolError::Truncated {
            message_type,
            expected: payload.len().next_multiple_of(4),
            actual: payload.len(),
        });
    }
    let mut reader = config.reader(message_type, payload);
    (0..payload.len() / 4).map(|_| reader.read_u32()).collect()
}

/// バックトレースのレコード列（ハンドル + オフセット）をデコードする
pub fn decode_positions(config: &SessionConfig, data: &[u8]) -> Result<Vec<CodePosition>> {
    let record_size = config.frame_record_size();
    let message_type = ServerMessageType::Backtrace.as_u8();
    if data.len() % record_size != 0 {
        return Err(ProtocolError::Truncated {
            message_type,
            expected: data.len().next_multiple_of(record_size),
            actual: data.len(),
        });
    }

    let mut reader = config.reader(message_type, data);
    let mut positions = Vec::with_capacity(data.len() / record_size);
    while reader.remaining() > 0 {
        positions.push(CodePosition {
            handle: reader.read_handle()?,
            offset: reader.read_u32()?,
        });
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteOrder, PointerSize, PROTOCOL_VERSION};

    fn config(pointer_size: PointerSize) -> SessionConfig {
        SessionConfig {
            byte_order: ByteOrder::Little,
            pointer_size,
            max_message_size: 128,
            version: PROTOCOL_VERSION,
        }
    }

    #[test]
    fn test_decode_breakpoint_hit() {
        let frame = [16, 0x34, 0x12, 7, 0, 0, 0];
        let message = ServerMessage::decode(&config(PointerSize::Two), &frame).unwrap();
        assert_eq!(
            message,
            ServerMessage::BreakpointHit(CodePosition {
                handle: ByteCodeHandle(0x1234),
                offset: 7
            })
        );
    }

    #[test]
    fn test_decode_lists_and_multipart() {
        let cfg = config(PointerSize::Four);
        let frame = [5, 1, 0, 0, 0, 4, 0, 0, 0];
        assert_eq!(
            ServerMessage::decode(&cfg, &frame).unwrap(),
            ServerMessage::BreakpointLines(vec![1, 4])
        );
        assert!(ServerMessage::decode(&cfg, &[6, 1, 0]).is_err());
        assert_eq!(
            ServerMessage::decode(&cfg, &[24, b'x', 1]).unwrap(),
            ServerMessage::Multipart(ServerMessageType::EvalResult)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_and_config() {
        let cfg = config(PointerSize::Two);
        assert_eq!(
            ServerMessage::decode(&cfg, &[99]),
            Err(ProtocolError::UnknownMessage(99))
        );
        assert_eq!(
            ServerMessage::decode(&cfg, &[1, 0]),
            Err(ProtocolError::UnexpectedMessage(1))
        );
        assert_eq!(ServerMessage::decode(&cfg, &[]), Err(ProtocolError::EmptyFrame));
    }

    #[test]
    fn test_decode_positions() {
        let cfg = config(PointerSize::Two);
        let data = [1, 0, 5, 0, 0, 0, 2, 0, 9, 0, 0, 0];
        let positions = decode_positions(&cfg, &data).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[1].handle, ByteCodeHandle(2));
        assert_eq!(positions[1].offset, 9);
        assert!(decode_positions(&cfg, &data[..5]).is_err());
    }
}
