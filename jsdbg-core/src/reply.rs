//! ターゲットに問い合わせずに答えられるコマンドの結果

use crate::breakpoint::{BreakpointEntry, BreakpointSpec, Deleted};
use crate::events::SourceListing;
use crate::function::{Location, SourceFunction};
use jsdbg_protocol::ByteCodeHandle;
use std::fmt;

/// 読み込み済み関数の概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSummary {
    pub handle: ByteCodeHandle,
    pub is_func: bool,
    pub name: String,
    pub source_name: String,
    pub line: u32,
    pub column: u32,
    pub breakpoint_lines: Vec<u32>,
}

impl From<&SourceFunction> for FunctionSummary {
    fn from(function: &SourceFunction) -> Self {
        Self {
            handle: function.handle,
            is_func: function.is_func,
            name: function.name.clone(),
            source_name: function.source_name.clone(),
            line: function.line,
            column: function.column,
            breakpoint_lines: function.breakpoint_lines().collect(),
        }
    }
}

impl fmt::Display for FunctionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.is_func, self.name.is_empty()) {
            (false, _) => "<toplevel>",
            (true, true) => "<anonymous>",
            (true, false) => self.name.as_str(),
        };
        let source_name = if self.source_name.is_empty() {
            "<unknown>"
        } else {
            self.source_name.as_str()
        };
        let lines: Vec<String> = self.breakpoint_lines.iter().map(u32::to_string).collect();
        write!(
            f,
            "{} {} ({}:{}:{}) lines: {}",
            self.handle,
            name,
            source_name,
            self.line,
            self.column,
            lines.join(", ")
        )
    }
}

/// コマンドへの応答
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 表示するものはない
    Empty,
    /// 有効化されたブレークポイント
    Breakpoints(Vec<Location>),
    /// 一致するブレークポイントがない。保留中のブレークポイントとして追加できる
    NotFound(BreakpointSpec),
    List(Vec<BreakpointEntry>),
    Deleted(Deleted),
    Source(SourceListing),
    Functions(Vec<FunctionSummary>),
    Message(String),
    Help,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => Ok(()),
            Reply::Breakpoints(locations) => {
                let lines: Vec<String> = locations
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
            Reply::NotFound(spec) => write!(f, "No breakpoint found for {}", spec),
            Reply::List(entries) => {
                if entries.is_empty() {
                    return write!(f, "No breakpoints");
                }
                let lines: Vec<String> = entries.iter().map(ToString::to_string).collect();
                write!(f, "{}", lines.join("\n"))
            }
            Reply::Deleted(deleted) => write!(f, "{}", deleted),
            Reply::Source(listing) => write!(f, "{}", listing),
            Reply::Functions(functions) => {
                if functions.is_empty() {
                    return write!(f, "No functions loaded");
                }
                let lines: Vec<String> = functions.iter().map(ToString::to_string).collect();
                write!(f, "{}", lines.join("\n"))
            }
            Reply::Message(message) => write!(f, "{}", message),
            Reply::Help => write!(f, "{}", crate::command::HELP),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_summary_display() {
        let summary = FunctionSummary {
            handle: ByteCodeHandle(0x2a),
            is_func: true,
            name: String::new(),
            source_name: "a.js".to_string(),
            line: 3,
            column: 7,
            breakpoint_lines: vec![3, 4],
        };
        assert_eq!(summary.to_string(), "{0x2a} <anonymous> (a.js:3:7) lines: 3, 4");
    }

    #[test]
    fn test_empty_list() {
        assert_eq!(Reply::List(Vec::new()).to_string(), "No breakpoints");
        assert_eq!(Reply::Empty.to_string(), "");
    }
}
