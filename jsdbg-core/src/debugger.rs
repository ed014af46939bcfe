//! デバッガのメインロジック

use crate::breakpoint::{BreakpointManager, BreakpointSpec, PendingBreakpoint};
use crate::command::Command;
use crate::events::{
    decode_scope_chain, decode_scope_variables, BacktraceFrame, EvalResult, Event, OutputBuffer,
    SourceListing, Stop, StopKind,
};
use crate::function::BreakpointId;
use crate::parser::{ParseStep, SourceParser};
use crate::registry::FunctionRegistry;
use crate::reply::{FunctionSummary, Reply};
use crate::{DebuggerError, Result};
use jsdbg_protocol::{
    decode_positions, reassemble, ByteCodeHandle, Channel, ClientMessage, CodePosition, Incoming,
    ServerMessage, ServerMessageType, SessionConfig, CONFIG_SIZE,
};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// メッセージ処理の結果
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// まだ何も届いていない。後で再度呼び出す
    Wait,
    /// ターゲットが実行中に届いたイベント
    Events(Vec<Event>),
    /// ターゲットが停止し、コマンドを待っている
    Prompt(Vec<Event>),
    /// セッションの終了
    End(Vec<Event>),
}

/// コマンド実行後の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// 引き続きコマンドを受け付ける
    Prompt(Reply),
    /// ターゲットの応答を待つ
    Resume,
    /// デバッガを終了する
    Quit,
}

/// ターゲットに送るクライアント側のソースファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSource {
    pub name: String,
    pub source: String,
}

/// リモートJavaScriptエンジンのデバッガ
pub struct Debugger<C: Channel> {
    /// ターゲットとのチャネル
    channel: C,
    /// ハンドシェイクで決まったセッション設定
    config: SessionConfig,
    /// 読み込み済み関数
    registry: FunctionRegistry,
    /// ブレークポイント管理
    breakpoints: BreakpointManager,
    /// 通常出力とデバッグログの行バッファ
    output: OutputBuffer,
    /// 次の例外停止で表示する例外文字列
    exception_hint: Vec<u8>,
    /// 直前に停止したブレークポイント
    last_stop: Option<BreakpointId>,
    /// 停止時に表示するソースの行数
    display: u32,
    /// バックトレースの最初のフレームの深さ
    backtrace_min: u32,
    /// 次のアクションで返すイベント
    queued: Vec<Event>,
    /// ターゲットの要求に応じて送るソース
    client_sources: VecDeque<ClientSource>,
}

impl<C: Channel> Debugger<C> {
    /// チャネルで接続し、ハンドシェイクを行う
    pub fn connect(mut channel: C) -> Result<Self> {
        let record = channel.connect(CONFIG_SIZE)?;
        let config = SessionConfig::parse(&record)?;
        debug!(
            "connected: byte order {:?}, pointer size {}, max message size {}",
            config.byte_order,
            config.pointer_size.bytes(),
            config.max_message_size
        );

        Ok(Self {
            channel,
            config,
            registry: FunctionRegistry::new(),
            breakpoints: BreakpointManager::new(),
            output: OutputBuffer::new(),
            exception_hint: Vec::new(),
            last_stop: None,
            display: 0,
            backtrace_min: 0,
            queued: Vec::new(),
            client_sources: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn breakpoints(&self) -> &BreakpointManager {
        &self.breakpoints
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// 停止時に表示するソースの行数を設定する
    pub fn set_display(&mut self, lines: u32) {
        self.display = lines;
    }

    /// ターゲットが要求したときに送るソースを追加する
    pub fn queue_client_source(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.client_sources.push_back(ClientSource {
            name: name.into(),
            source: source.into(),
        });
    }

    /// メッセージを送信する
    pub fn send(&mut self, message: ClientMessage) -> Result<()> {
        debug!("sending {:?}", message.message_type());
        for frame in message.encode(&self.config) {
            self.channel.send_message(self.config.byte_order, &frame)?;
        }
        Ok(())
    }

    fn flush_outbox(&mut self) -> Result<()> {
        for message in self.breakpoints.take_outbox() {
            self.send(message)?;
        }
        Ok(())
    }

    /// 実行中のスクリプトを停止させる
    pub fn stop(&mut self) -> Result<()> {
        self.send(ClientMessage::Stop)
    }

    /// 接続を閉じる
    pub fn close(&mut self) -> Result<()> {
        self.channel.close()?;
        Ok(())
    }

    /// 届いているメッセージを処理する
    ///
    /// 論理メッセージの境界でのみノンブロッキング読み取りを行い、分割された
    /// メッセージの途中はブロッキング読み取りで最後まで受信します。
    pub fn process_messages(&mut self) -> Result<Action> {
        loop {
            let frame = match self.channel.get_message(false)? {
                Incoming::Message(frame) => frame,
                Incoming::Empty => {
                    if self.queued.is_empty() {
                        return Ok(Action::Wait);
                    }
                    return Ok(Action::Events(std::mem::take(&mut self.queued)));
                }
                Incoming::Eof => return Ok(self.end()),
            };

            match self.handle_frame(frame) {
                Ok(Some(action)) => return Ok(action),
                Ok(None) => {}
                // 分割メッセージの途中で切断された
                Err(DebuggerError::ConnectionClosed) => return Ok(self.end()),
                Err(e) => return Err(e),
            }
        }
    }

    /// セッションを終了し、バッファに残った出力を返す
    fn end(&mut self) -> Action {
        debug!("connection closed");
        let mut events = std::mem::take(&mut self.queued);
        events.extend(self.output.flush().into_iter().map(Event::Output));
        events.push(Event::Closed);
        Action::End(events)
    }

    fn with_queued(&mut self, events: Vec<Event>) -> Vec<Event> {
        let mut all = std::mem::take(&mut self.queued);
        all.extend(events);
        all
    }

    fn handle_frame(&mut self, frame: Vec<u8>) -> Result<Option<Action>> {
        let message = ServerMessage::decode(&self.config, &frame)?;
        debug!("received message type {} ({} bytes)", frame[0], frame.len());

        let action = match message {
            ServerMessage::ParseError
            | ServerMessage::ByteCodeCp(_)
            | ServerMessage::ParseFunction { .. }
            | ServerMessage::BreakpointLines(_)
            | ServerMessage::BreakpointOffsets(_)
            | ServerMessage::SourceCode { .. }
            | ServerMessage::SourceCodeName { .. }
            | ServerMessage::FunctionName { .. } => {
                let events = self.parse_source(message)?;
                if events.is_empty() {
                    return Ok(None);
                }
                let events = self.with_queued(events);
                Action::Events(events)
            }
            ServerMessage::WaitingAfterParse => {
                self.send(ClientMessage::ParserResume)?;
                return Ok(None);
            }
            ServerMessage::ReleaseByteCodeCp(handle) => {
                self.release_function(handle)?;
                return Ok(None);
            }
            ServerMessage::Memstats(stats) => {
                Action::Prompt(self.with_queued(vec![Event::Memstats(stats)]))
            }
            ServerMessage::BreakpointHit(position) => {
                let events = self.stop_at(position, StopKind::Breakpoint)?;
                Action::Prompt(self.with_queued(events))
            }
            ServerMessage::ExceptionHit(position) => {
                let hint = (!self.exception_hint.is_empty()).then(|| {
                    let data = std::mem::take(&mut self.exception_hint);
                    String::from_utf8_lossy(&data).into_owned()
                });
                let events = self.stop_at(position, StopKind::Exception { hint })?;
                Action::Prompt(self.with_queued(events))
            }
            ServerMessage::ExceptionStr { data, .. } => {
                self.exception_hint.extend_from_slice(&data);
                return Ok(None);
            }
            ServerMessage::BacktraceTotal(total) => {
                self.queued.push(Event::BacktraceTotal(total));
                return Ok(None);
            }
            ServerMessage::Multipart(base) => match self.receive_multipart(base, &frame)? {
                Some(action) => action,
                None => return Ok(None),
            },
            ServerMessage::WaitForSource => {
                let events = self.send_client_source()?;
                if events.is_empty() {
                    return Ok(None);
                }
                Action::Events(self.with_queued(events))
            }
            ServerMessage::CloseConnection => self.end(),
        };

        Ok(Some(action))
    }

    /// パース単位を最後まで受信して関数を登録する
    fn parse_source(&mut self, first: ServerMessage) -> Result<Vec<Event>> {
        let mut parser = SourceParser::new();
        let mut message = first;

        let functions = loop {
            match parser.feed(message)? {
                ParseStep::Continue => {}
                ParseStep::Dropped(handle) => self.send(ClientMessage::FreeByteCodeCp(handle))?,
                ParseStep::ReleaseLive(handle) => self.release_function(handle)?,
                ParseStep::Complete(functions) => break functions,
            }

            message = loop {
                let frame = next_frame(&mut self.channel)?;
                match ServerMessage::decode(&self.config, &frame)? {
                    ServerMessage::Multipart(ServerMessageType::OutputResult) => {
                        self.receive_output(&frame)?;
                    }
                    other => break other,
                }
            };
        };

        let merged = self.registry.merge(functions);
        self.breakpoints.forget_released(&merged.replaced);
        if self
            .last_stop
            .is_some_and(|id| merged.handles.contains(&id.handle))
        {
            self.last_stop = None;
        }
        let resolved = self
            .breakpoints
            .resolve_pending(&mut self.registry, &merged.handles);
        self.flush_outbox()?;

        Ok(resolved.into_iter().map(Event::PendingResolved).collect())
    }

    /// 関数を登録解除し、解放を承認する
    ///
    /// ターゲット側のブレークポイントは関数とともに消えるので、無効化の要求は送らない。
    fn release_function(&mut self, handle: ByteCodeHandle) -> Result<()> {
        let released = self.registry.release(handle)?;
        self.breakpoints.forget_released(&released);
        if self.last_stop.is_some_and(|id| id.handle == handle) {
            self.last_stop = None;
        }
        self.send(ClientMessage::FreeByteCodeCp(handle))
    }

    fn stop_at(&mut self, position: CodePosition, kind: StopKind) -> Result<Vec<Event>> {
        let (id, exact) = self.registry.resolve(position)?;
        let location = self
            .registry
            .location(id)
            .ok_or(jsdbg_protocol::ProtocolError::UnknownHandle(position.handle.0))?;
        self.last_stop = Some(id);

        let mut events = vec![Event::Stop(Stop {
            location,
            exact,
            kind,
        })];
        if self.display > 0 {
            if let Ok(listing) = self.source_listing(self.display) {
                events.push(Event::Source(listing));
            }
        }
        Ok(events)
    }

    /// 分割された論理メッセージを受信する
    fn receive_multipart(
        &mut self,
        base: ServerMessageType,
        first: &[u8],
    ) -> Result<Option<Action>> {
        let with_subtype = matches!(
            base,
            ServerMessageType::EvalResult | ServerMessageType::OutputResult
        );
        let channel = &mut self.channel;
        let assembled = reassemble(base, with_subtype, first, || next_frame(channel))?;

        let event = match base {
            ServerMessageType::Backtrace => {
                let positions = decode_positions(&self.config, &assembled.data)?;
                let mut frames = Vec::with_capacity(positions.len());
                for (depth, position) in (self.backtrace_min..).zip(positions) {
                    let (id, _) = self.registry.resolve(position)?;
                    if let Some(location) = self.registry.location(id) {
                        frames.push(BacktraceFrame { depth, location });
                    }
                }
                Event::Backtrace(frames)
            }
            ServerMessageType::EvalResult => {
                let subtype = assembled.subtype.unwrap_or(0);
                Event::Eval(EvalResult::from_parts(&assembled.data, subtype)?)
            }
            ServerMessageType::OutputResult => {
                let records = self.output.push(&assembled.data, assembled.subtype.unwrap_or(0))?;
                if records.is_empty() {
                    return Ok(None);
                }
                let events = records.into_iter().map(Event::Output).collect();
                return Ok(Some(Action::Events(self.with_queued(events))));
            }
            ServerMessageType::ScopeChain => {
                Event::ScopeChain(decode_scope_chain(&assembled.data)?)
            }
            ServerMessageType::ScopeVariables => {
                Event::ScopeVariables(decode_scope_variables(&assembled.data)?)
            }
            other => {
                warn!("unexpected multipart message {:?}", other);
                return Err(jsdbg_protocol::ProtocolError::UnexpectedMessage(other.as_u8()).into());
            }
        };

        Ok(Some(Action::Prompt(self.with_queued(vec![event]))))
    }

    /// パース中に割り込んだ出力を受信し、次のアクションまで保持する
    fn receive_output(&mut self, first: &[u8]) -> Result<()> {
        let channel = &mut self.channel;
        let assembled = reassemble(ServerMessageType::OutputResult, true, first, || {
            next_frame(channel)
        })?;
        let records = self.output.push(&assembled.data, assembled.subtype.unwrap_or(0))?;
        self.queued.extend(records.into_iter().map(Event::Output));
        Ok(())
    }

    fn send_client_source(&mut self) -> Result<Vec<Event>> {
        match self.client_sources.pop_front() {
            Some(ClientSource { name, source }) => {
                debug!("sending client source {}", name);
                self.send(ClientMessage::ClientSource {
                    name: name.clone(),
                    source,
                })?;
                Ok(vec![Event::SourceSent(name)])
            }
            None => {
                self.send(ClientMessage::NoMoreSources)?;
                Ok(Vec::new())
            }
        }
    }

    /// コマンドを実行する
    pub fn dispatch(&mut self, command: Command) -> Result<Dispatch> {
        let reply = match command {
            Command::Break(spec) => {
                let locations = self.breakpoints.set(&mut self.registry, &spec);
                self.flush_outbox()?;
                if locations.is_empty() {
                    Reply::NotFound(spec)
                } else {
                    Reply::Breakpoints(locations)
                }
            }
            Command::List => Reply::List(self.breakpoints.list(&self.registry)),
            Command::Delete(target) => {
                let deleted = self.breakpoints.delete(&mut self.registry, target);
                self.flush_outbox()?;
                Reply::Deleted(deleted?)
            }
            Command::Continue => return self.resume(ClientMessage::Continue),
            Command::Step => return self.resume(ClientMessage::Step),
            Command::Next => return self.resume(ClientMessage::Next),
            Command::Finish => return self.resume(ClientMessage::Finish),
            Command::Stop => return self.resume(ClientMessage::Stop),
            Command::Backtrace(request) => {
                self.backtrace_min = request.min_depth;
                return self.resume(ClientMessage::GetBacktrace {
                    min_depth: request.min_depth,
                    max_depth: request.max_depth,
                    get_total: request.get_total,
                });
            }
            Command::Eval { kind, level, code } => {
                return self.resume(ClientMessage::Eval { kind, level, code })
            }
            Command::Exception(enable) => {
                self.send(ClientMessage::ExceptionConfig { enable })?;
                let state = if enable { "enabled" } else { "disabled" };
                Reply::Message(format!("Stop at exception {}", state))
            }
            Command::Memstats => return self.resume(ClientMessage::Memstats),
            Command::Scopes => return self.resume(ClientMessage::GetScopeChain),
            Command::Variables(level) => {
                return self.resume(ClientMessage::GetScopeVariables { level })
            }
            Command::Source(lines) => Reply::Source(self.source_listing(lines)?),
            Command::Display(lines) => {
                self.display = lines;
                Reply::Empty
            }
            Command::Dump => Reply::Functions(self.function_summaries()),
            Command::Restart => return self.resume(ClientMessage::ContextReset),
            Command::Help => Reply::Help,
            Command::Quit => {
                self.send(ClientMessage::Continue)?;
                return Ok(Dispatch::Quit);
            }
        };

        Ok(Dispatch::Prompt(reply))
    }

    fn resume(&mut self, message: ClientMessage) -> Result<Dispatch> {
        self.send(message)?;
        Ok(Dispatch::Resume)
    }

    /// 一致するブレークポイントがなかった指定を保留中のブレークポイントにする
    pub fn add_pending_breakpoint(&mut self, spec: BreakpointSpec) -> Result<PendingBreakpoint> {
        let pending = self.breakpoints.add_pending(spec);
        self.flush_outbox()?;
        pending
    }

    /// 直前の停止位置の前後のソース
    pub fn source_listing(&self, context: u32) -> Result<SourceListing> {
        let id = self
            .last_stop
            .ok_or_else(|| DebuggerError::user("Error: No stop location available"))?;
        let function = self
            .registry
            .get(id.handle)
            .ok_or_else(|| DebuggerError::user("Error: No stop location available"))?;
        let line = function.breakpoint(id.slot).map_or(function.line, |b| b.line);
        Ok(SourceListing::around(
            &function.source_name,
            &function.source,
            line,
            context,
        ))
    }

    /// 読み込み済みの関数の一覧（ハンドル順）
    pub fn function_summaries(&self) -> Vec<FunctionSummary> {
        let mut summaries: Vec<FunctionSummary> =
            self.registry.functions().map(FunctionSummary::from).collect();
        summaries.sort_by_key(|summary| summary.handle);
        summaries
    }
}

/// 論理メッセージの続きをブロッキング読み取りで取得する
fn next_frame<C: Channel>(channel: &mut C) -> Result<Vec<u8>> {
    loop {
        match channel.get_message(true)? {
            Incoming::Message(frame) => return Ok(frame),
            Incoming::Empty => continue,
            Incoming::Eof => return Err(DebuggerError::ConnectionClosed),
        }
    }
}
