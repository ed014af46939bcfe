//! ターゲットから届いた実行時イベントの再構築と表示

use crate::breakpoint::ResolvedPending;
use crate::function::Location;
use crate::{DebuggerError, Result};
use jsdbg_protocol::{
    MemStats, OutputSubtype, ProtocolError, ScopeKind, ServerMessageType, ValueType,
};
use std::fmt;
use tracing::warn;

/// 停止の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopKind {
    Breakpoint,
    /// 例外による停止。ターゲットが送った例外文字列を持つことがある
    Exception { hint: Option<String> },
}

/// 実行が停止した位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    pub location: Location,
    /// オフセットがブレークポイントに完全一致したか
    pub exact: bool,
    pub kind: StopKind,
}

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let StopKind::Exception { hint } = &self.kind {
            writeln!(f, "Exception throw detected (to disable automatic stop type exception 0)")?;
            if let Some(hint) = hint {
                writeln!(f, "Exception hint: {}", hint)?;
            }
        }

        let at = if self.exact { "at" } else { "around" };
        write!(f, "Stopped {}", at)?;
        if let Some(index) = self.location.active_index {
            write!(f, " breakpoint:{}", index)?;
        }
        write!(f, " {}", self.location)
    }
}

/// バックトレースの1フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub depth: u32,
    pub location: Location,
}

impl fmt::Display for BacktraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame {}: {}", self.depth, self.location)
    }
}

/// evalの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalResult {
    pub text: String,
    /// 評価中に例外が発生した
    pub exception: bool,
}

impl EvalResult {
    /// 再構築したペイロードとサブタイプから作成する
    pub fn from_parts(data: &[u8], subtype: u8) -> Result<Self> {
        let text = String::from_utf8_lossy(data).into_owned();
        match jsdbg_protocol::EvalSubtype::from_u8(subtype) {
            Some(jsdbg_protocol::EvalSubtype::Ok) => Ok(Self {
                text,
                exception: false,
            }),
            Some(jsdbg_protocol::EvalSubtype::Error) => Ok(Self {
                text,
                exception: true,
            }),
            None => Err(ProtocolError::BadSubtype {
                message_type: ServerMessageType::EvalResult.as_u8(),
                subtype,
            }
            .into()),
        }
    }
}

impl fmt::Display for EvalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exception {
            write!(f, "Uncaught exception: {}", self.text)
        } else {
            write!(f, "{}", self.text)
        }
    }
}

/// 出力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Normal,
    Error,
    Warning,
    Debug,
    Trace,
}

impl OutputKind {
    fn prefix(self) -> &'static str {
        match self {
            OutputKind::Normal => "out:",
            OutputKind::Error => "err:",
            OutputKind::Warning => "warn:",
            OutputKind::Debug => "log:",
            OutputKind::Trace => "trace:",
        }
    }
}

impl From<OutputSubtype> for OutputKind {
    fn from(subtype: OutputSubtype) -> Self {
        match subtype {
            OutputSubtype::Ok => OutputKind::Normal,
            OutputSubtype::Error => OutputKind::Error,
            OutputSubtype::Warning => OutputKind::Warning,
            OutputSubtype::Debug => OutputKind::Debug,
            OutputSubtype::Trace => OutputKind::Trace,
        }
    }
}

/// 出力の1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub kind: OutputKind,
    pub text: String,
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.prefix(), self.text)
    }
}

/// 通常出力とデバッグログの行バッファ
///
/// 改行で終わっていない末尾は次のメッセージまで保持します。
#[derive(Debug, Default)]
pub struct OutputBuffer {
    normal: String,
    debug: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 再構築した出力メッセージを追加し、完成した行を返す
    pub fn push(&mut self, data: &[u8], subtype: u8) -> Result<Vec<OutputRecord>> {
        let subtype = OutputSubtype::from_u8(subtype).ok_or(ProtocolError::BadSubtype {
            message_type: ServerMessageType::OutputResult.as_u8(),
            subtype,
        })?;
        let kind = OutputKind::from(subtype);
        let text = String::from_utf8_lossy(data);

        let buffer = match kind {
            OutputKind::Normal => &mut self.normal,
            OutputKind::Debug => &mut self.debug,
            _ => {
                return Ok(vec![OutputRecord {
                    kind,
                    text: text.trim_end_matches('\n').to_string(),
                }])
            }
        };

        buffer.push_str(&text);
        let Some(last_newline) = buffer.rfind('\n') else {
            return Ok(Vec::new());
        };
        let rest = buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(buffer, rest);
        let lines = complete.strip_suffix('\n').unwrap_or(&complete);
        Ok(lines
            .split('\n')
            .map(|line| OutputRecord {
                kind,
                text: line.to_string(),
            })
            .collect())
    }

    /// 保持している未完成の行を全て取り出す
    pub fn flush(&mut self) -> Vec<OutputRecord> {
        [
            (OutputKind::Normal, std::mem::take(&mut self.normal)),
            (OutputKind::Debug, std::mem::take(&mut self.debug)),
        ]
        .into_iter()
        .filter(|(_, text)| !text.is_empty())
        .map(|(kind, text)| OutputRecord { kind, text })
        .collect()
    }
}

/// スコープ内の変数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeVariable {
    pub name: String,
    pub value_type: ValueType,
    pub value: String,
}

impl ScopeVariable {
    /// 表示用の値。配列は角括弧で囲む
    pub fn rendered_value(&self) -> String {
        match self.value_type {
            ValueType::Array => format!("[{}]", self.value),
            _ => self.value.clone(),
        }
    }
}

/// スコープ変数のレコード列 `(len:1, name, type:1, len:1, value)*` をデコードする
pub fn decode_scope_variables(data: &[u8]) -> Result<Vec<ScopeVariable>> {
    let mut pos = 0;
    let mut variables = Vec::new();
    while pos < data.len() {
        let name_len = take(data, &mut pos, 1)?[0] as usize;
        let name = String::from_utf8_lossy(take(data, &mut pos, name_len)?).into_owned();
        let raw_type = take(data, &mut pos, 1)?[0];
        let value_len = take(data, &mut pos, 1)?[0] as usize;
        let value = String::from_utf8_lossy(take(data, &mut pos, value_len)?).into_owned();

        match ValueType::from_u8(raw_type) {
            Some(value_type) => variables.push(ScopeVariable {
                name,
                value_type,
                value,
            }),
            None => warn!("skipping variable {} with unknown value type {}", name, raw_type),
        }
    }
    Ok(variables)
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = *pos + len;
    let chunk = data.get(*pos..end).ok_or(ProtocolError::Truncated {
        message_type: ServerMessageType::ScopeVariables.as_u8(),
        expected: end,
        actual: data.len(),
    })?;
    *pos = end;
    Ok(chunk)
}

/// スコープチェーン（1レベル1バイト）をデコードする
pub fn decode_scope_chain(data: &[u8]) -> Result<Vec<ScopeKind>> {
    data.iter()
        .map(|&kind| {
            ScopeKind::from_u8(kind)
                .ok_or_else(|| DebuggerError::from(ProtocolError::BadScopeKind(kind)))
        })
        .collect()
}

/// 関数ソースの表示範囲
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceListing {
    pub source_name: String,
    /// 現在の行（1始まり）
    pub current: u32,
    /// (行番号, 内容)
    pub lines: Vec<(u32, String)>,
}

impl SourceListing {
    /// `context` 行の前後を切り出す。0なら全体
    pub fn around(source_name: &str, source: &[String], current: u32, context: u32) -> Self {
        let total = source.len();
        let (start, end) = if context == 0 {
            (0, total)
        } else {
            let start = current.saturating_sub(context) as usize;
            let end = current.saturating_add(context).saturating_sub(1) as usize;
            (start.min(total), end.min(total))
        };

        Self {
            source_name: source_name.to_string(),
            current,
            lines: source[start..end.max(start)]
                .iter()
                .enumerate()
                .map(|(i, line)| ((start + i + 1) as u32, line.clone()))
                .collect(),
        }
    }
}

impl fmt::Display for SourceListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.source_name.is_empty() {
            writeln!(f, "Source: {}", self.source_name)?;
        }
        for (i, (number, line)) in self.lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if *number == self.current {
                write!(f, "{:4} > {}", number, line)?;
            } else {
                write!(f, "{:4}   {}", number, line)?;
            }
        }
        Ok(())
    }
}

/// 列幅を揃えた表を書き出す
fn write_table(f: &mut fmt::Formatter<'_>, rows: &[Vec<String>]) -> fmt::Result {
    let columns = rows.first().map_or(0, Vec::len);
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|row| row[c].chars().count()).max().unwrap_or(0))
        .collect();

    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{:width$}", cell, width = width))
            .collect();
        write!(f, "{}", cells.join(" | ").trim_end())?;
    }
    Ok(())
}

/// 表示できるイベント
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Stop(Stop),
    /// 停止位置周辺のソース
    Source(SourceListing),
    Backtrace(Vec<BacktraceFrame>),
    BacktraceTotal(u32),
    Eval(EvalResult),
    Output(OutputRecord),
    Memstats(MemStats),
    ScopeChain(Vec<ScopeKind>),
    ScopeVariables(Vec<ScopeVariable>),
    PendingResolved(ResolvedPending),
    /// クライアント側のソースを送った
    SourceSent(String),
    /// 接続の終了
    Closed,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Stop(stop) => write!(f, "{}", stop),
            Event::Source(listing) => write!(f, "{}", listing),
            Event::Backtrace(frames) => {
                if frames.is_empty() {
                    return write!(f, "No backtrace available");
                }
                let lines: Vec<String> = frames.iter().map(ToString::to_string).collect();
                write!(f, "{}", lines.join("\n"))
            }
            Event::BacktraceTotal(total) => write!(f, "Total number of frames: {}", total),
            Event::Eval(result) => write!(f, "{}", result),
            Event::Output(record) => write!(f, "{}", record),
            Event::Memstats(stats) => write!(
                f,
                "Allocated bytes: {}\nByte code bytes: {}\nString bytes: {}\n\
                 Object bytes: {}\nProperty bytes: {}",
                stats.allocated_bytes,
                stats.byte_code_bytes,
                stats.string_bytes,
                stats.object_bytes,
                stats.property_bytes
            ),
            Event::ScopeChain(kinds) => {
                let mut rows = vec![vec!["level".to_string(), "type".to_string()]];
                rows.extend(
                    kinds
                        .iter()
                        .enumerate()
                        .map(|(level, kind)| vec![level.to_string(), kind.name().to_string()]),
                );
                write_table(f, &rows)
            }
            Event::ScopeVariables(variables) => {
                let mut rows = vec![vec![
                    "name".to_string(),
                    "type".to_string(),
                    "value".to_string(),
                ]];
                rows.extend(variables.iter().map(|v| {
                    vec![v.name.clone(), v.value_type.name().to_string(), v.rendered_value()]
                }));
                write_table(f, &rows)
            }
            Event::PendingResolved(resolved) => {
                let lines: Vec<String> = resolved
                    .locations
                    .iter()
                    .map(|location| {
                        format!(
                            "Breakpoint {} at {}",
                            location.active_index.unwrap_or_default(),
                            location
                        )
                    })
                    .collect();
                write!(f, "{}", lines.join("\n"))
            }
            Event::SourceSent(name) => write!(f, "Source {} sent", name),
            Event::Closed => write!(f, "Connection closed"),
        }
    }
}
