//! ソース解析イベントから関数情報を組み立てるパーサ
//!
//! 1つのパース単位は、トップレベルのスクリプトと、そこから再帰的に見つかった
//! ネストした関数のフレーム列です。構築中の関数レコードを明示的なスタックで保持し、
//! バイトコードハンドルを受け取るたびに一番上のレコードを確定させます。
//! スタックが空になった時点でパース単位は完了します。

use crate::function::SourceFunction;
use crate::{DebuggerError, Result};
use jsdbg_protocol::{ByteCodeHandle, ServerMessage, ServerMessageType};
use tracing::debug;

/// パーサの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// まだ何も受け取っていない
    Idle,
    /// ソースや名前の断片を蓄積中
    Accumulating,
    /// ネストした関数を構築中
    BuildingStack,
    /// 全ての関数が確定した
    Complete,
}

/// 構築中の関数レコード
#[derive(Debug, Clone)]
pub struct FunctionBuild {
    pub source: String,
    pub source_name: String,
    pub name: String,
    pub line: u32,
    pub column: u32,
    pub lines: Vec<u32>,
    pub offsets: Vec<u32>,
}

impl FunctionBuild {
    /// トップレベルのスコープ用のレコード
    pub fn top_level() -> Self {
        Self {
            source: String::new(),
            source_name: String::new(),
            name: String::new(),
            line: 1,
            column: 1,
            lines: Vec::new(),
            offsets: Vec::new(),
        }
    }
}

/// 1フレームを処理した結果
#[derive(Debug)]
pub enum ParseStep {
    /// 次のフレームが必要
    Continue,
    /// 同じパース単位で定義し直されたため破棄した関数。解放の承認を送る必要がある
    Dropped(ByteCodeHandle),
    /// 登録済みの関数の解放要求。通常の解放処理に回す
    ReleaseLive(ByteCodeHandle),
    /// パース単位の完了。定義順に並んだ関数
    Complete(Vec<SourceFunction>),
}

/// パース単位ごとに作成するソースパーサ
#[derive(Debug)]
pub struct SourceParser {
    state: ParserState,
    source: Vec<u8>,
    source_name: Vec<u8>,
    function_name: Vec<u8>,
    stack: Vec<FunctionBuild>,
    staged: Vec<SourceFunction>,
}

impl SourceParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            source: Vec::new(),
            source_name: Vec::new(),
            function_name: Vec::new(),
            stack: vec![FunctionBuild::top_level()],
            staged: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// 確定済みでまだ登録されていない関数
    pub fn staged(&self) -> &[SourceFunction] {
        &self.staged
    }

    /// メッセージを1つ処理する
    pub fn feed(&mut self, message: ServerMessage) -> Result<ParseStep> {
        if self.state == ParserState::Complete {
            return Err(DebuggerError::Protocol(
                jsdbg_protocol::ProtocolError::UnexpectedMessage(message_type(&message)),
            ));
        }

        match message {
            ServerMessage::ParseError => {
                debug!("syntax error found, dropping {} staged functions", self.staged.len());
                return Err(DebuggerError::Parse);
            }
            ServerMessage::SourceCode { data, .. } => {
                self.accumulate();
                self.source.extend_from_slice(&data);
            }
            ServerMessage::SourceCodeName { data, .. } => {
                self.accumulate();
                self.source_name.extend_from_slice(&data);
            }
            ServerMessage::FunctionName { data, .. } => {
                self.accumulate();
                self.function_name.extend_from_slice(&data);
            }
            ServerMessage::ParseFunction { line, column } => {
                let name = decode_text(&std::mem::take(&mut self.function_name));
                debug!(
                    source_name = %decode_text(&self.source_name),
                    function_name = %name,
                    line,
                    column,
                    "function definition"
                );
                self.stack.push(FunctionBuild {
                    source: decode_text(&self.source),
                    source_name: decode_text(&self.source_name),
                    name,
                    line,
                    column,
                    lines: Vec::new(),
                    offsets: Vec::new(),
                });
                self.state = ParserState::BuildingStack;
            }
            ServerMessage::BreakpointLines(lines) => {
                self.top_mut()?.lines.extend(lines);
            }
            ServerMessage::BreakpointOffsets(offsets) => {
                self.top_mut()?.offsets.extend(offsets);
            }
            ServerMessage::ByteCodeCp(handle) => return self.finish_function(handle),
            ServerMessage::ReleaseByteCodeCp(handle) => {
                if let Some(pos) = self.staged.iter().position(|f| f.handle == handle) {
                    debug!("function {} redefined during parsing", handle);
                    self.staged.remove(pos);
                    return Ok(ParseStep::Dropped(handle));
                }
                return Ok(ParseStep::ReleaseLive(handle));
            }
            other => {
                let found = message_type(&other);
                return Err(jsdbg_protocol::ProtocolError::UnexpectedMessage(found).into());
            }
        }

        Ok(ParseStep::Continue)
    }

    fn accumulate(&mut self) {
        if self.state == ParserState::Idle {
            self.state = ParserState::Accumulating;
        }
    }

    fn top_mut(&mut self) -> Result<&mut FunctionBuild> {
        self.stack
            .last_mut()
            .ok_or(DebuggerError::Protocol(jsdbg_protocol::ProtocolError::UnexpectedMessage(
                ServerMessageType::BreakpointList.as_u8(),
            )))
    }

    /// 一番上のレコードを確定させてステージングに置く
    fn finish_function(&mut self, handle: ByteCodeHandle) -> Result<ParseStep> {
        debug!("byte code handle received: {}", handle);

        let mut build = self.stack.pop().ok_or(DebuggerError::Protocol(
            jsdbg_protocol::ProtocolError::UnexpectedMessage(ServerMessageType::ByteCodeCp.as_u8()),
        ))?;

        // スタックの最後のレコードはスクリプトのトップレベルのコード
        let is_func = !self.stack.is_empty();
        if !is_func {
            build.source = decode_text(&self.source);
            build.source_name = decode_text(&self.source_name);
        }

        let function = SourceFunction::from_build(handle, is_func, build)?;
        self.staged.retain(|f| f.handle != handle);
        self.staged.push(function);

        if is_func {
            return Ok(ParseStep::Continue);
        }

        debug!("parse completed with {} functions", self.staged.len());
        self.state = ParserState::Complete;
        Ok(ParseStep::Complete(std::mem::take(&mut self.staged)))
    }
}

impl Default for SourceParser {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// ログとエラー用にメッセージの型番号を取得する
fn message_type(message: &ServerMessage) -> u8 {
    use ServerMessageType as T;
    let message_type = match message {
        ServerMessage::ParseError => T::ParseError,
        ServerMessage::ByteCodeCp(_) => T::ByteCodeCp,
        ServerMessage::ParseFunction { .. } => T::ParseFunction,
        ServerMessage::BreakpointLines(_) => T::BreakpointList,
        ServerMessage::BreakpointOffsets(_) => T::BreakpointOffsetList,
        ServerMessage::SourceCode { .. } => T::SourceCode,
        ServerMessage::SourceCodeName { .. } => T::SourceCodeName,
        ServerMessage::FunctionName { .. } => T::FunctionName,
        ServerMessage::WaitingAfterParse => T::WaitingAfterParse,
        ServerMessage::ReleaseByteCodeCp(_) => T::ReleaseByteCodeCp,
        ServerMessage::Memstats(_) => T::MemstatsReceive,
        ServerMessage::BreakpointHit(_) => T::BreakpointHit,
        ServerMessage::ExceptionHit(_) => T::ExceptionHit,
        ServerMessage::ExceptionStr { .. } => T::ExceptionStr,
        ServerMessage::BacktraceTotal(_) => T::BacktraceTotal,
        ServerMessage::Multipart(base) => *base,
        ServerMessage::WaitForSource => T::WaitForSource,
        ServerMessage::CloseConnection => T::CloseConnection,
    };
    message_type.as_u8()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut SourceParser, messages: Vec<ServerMessage>) -> Vec<ParseStep> {
        messages
            .into_iter()
            .map(|m| parser.feed(m).unwrap())
            .collect()
    }

    #[test]
    fn test_nested_function_unit() {
        let mut parser = SourceParser::new();
        assert_eq!(parser.state(), ParserState::Idle);

        let steps = feed_all(
            &mut parser,
            vec![
                ServerMessage::SourceCode {
                    data: b"function f() {\n  return 1;\n}\nf();\n".to_vec(),
                    end: true,
                },
                ServerMessage::SourceCodeName {
                    data: b"a.js".to_vec(),
                    end: true,
                },
                ServerMessage::FunctionName {
                    data: b"f".to_vec(),
                    end: true,
                },
                ServerMessage::ParseFunction { line: 1, column: 1 },
                ServerMessage::BreakpointLines(vec![2]),
                ServerMessage::BreakpointOffsets(vec![8]),
                ServerMessage::ByteCodeCp(ByteCodeHandle(0x20)),
            ],
        );
        assert!(steps.iter().all(|s| matches!(s, ParseStep::Continue)));
        assert_eq!(parser.state(), ParserState::BuildingStack);
        assert_eq!(parser.staged().len(), 1);
        assert!(parser.staged()[0].is_func);
        assert_eq!(parser.staged()[0].name, "f");

        parser.feed(ServerMessage::BreakpointLines(vec![4])).unwrap();
        parser.feed(ServerMessage::BreakpointOffsets(vec![3])).unwrap();
        let step = parser.feed(ServerMessage::ByteCodeCp(ByteCodeHandle(0x10))).unwrap();

        let ParseStep::Complete(functions) = step else {
            panic!("expected completed parse");
        };
        assert_eq!(parser.state(), ParserState::Complete);
        assert_eq!(functions.len(), 2);
        let top = &functions[1];
        assert!(!top.is_func);
        assert_eq!(top.source_name, "a.js");
        assert_eq!(top.source.len(), 4);
        assert_eq!(top.breakpoints()[0].line, 4);
        assert_eq!(functions[0].source_name, "a.js");
    }

    #[test]
    fn test_function_name_is_consumed_by_definition() {
        let mut parser = SourceParser::new();
        parser
            .feed(ServerMessage::FunctionName {
                data: b"g".to_vec(),
                end: true,
            })
            .unwrap();
        parser.feed(ServerMessage::ParseFunction { line: 3, column: 2 }).unwrap();
        parser.feed(ServerMessage::ParseFunction { line: 5, column: 4 }).unwrap();
        parser.feed(ServerMessage::BreakpointLines(vec![5])).unwrap();
        parser.feed(ServerMessage::BreakpointOffsets(vec![1])).unwrap();
        parser.feed(ServerMessage::ByteCodeCp(ByteCodeHandle(3))).unwrap();
        assert_eq!(parser.staged()[0].name, "");
        assert_eq!(parser.staged()[0].line, 5);
    }

    #[test]
    fn test_release_during_parse() {
        let mut parser = SourceParser::new();
        parser.feed(ServerMessage::ParseFunction { line: 1, column: 1 }).unwrap();
        parser.feed(ServerMessage::BreakpointLines(vec![1])).unwrap();
        parser.feed(ServerMessage::BreakpointOffsets(vec![1])).unwrap();
        parser.feed(ServerMessage::ByteCodeCp(ByteCodeHandle(9))).unwrap();

        let step = parser.feed(ServerMessage::ReleaseByteCodeCp(ByteCodeHandle(9))).unwrap();
        assert!(matches!(step, ParseStep::Dropped(ByteCodeHandle(9))));
        assert!(parser.staged().is_empty());

        let step = parser.feed(ServerMessage::ReleaseByteCodeCp(ByteCodeHandle(4))).unwrap();
        assert!(matches!(step, ParseStep::ReleaseLive(ByteCodeHandle(4))));
    }

    #[test]
    fn test_parse_error_aborts_unit() {
        let mut parser = SourceParser::new();
        parser
            .feed(ServerMessage::SourceCode {
                data: b"var = ;".to_vec(),
                end: true,
            })
            .unwrap();
        assert!(matches!(parser.feed(ServerMessage::ParseError), Err(DebuggerError::Parse)));
    }

    #[test]
    fn test_unexpected_message_is_protocol_error() {
        let mut parser = SourceParser::new();
        let err = parser.feed(ServerMessage::WaitForSource).unwrap_err();
        assert!(err.is_fatal());
    }
}
