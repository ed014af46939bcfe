//! ターゲットで読み込まれた関数とそのブレークポイント

use crate::parser::FunctionBuild;
use crate::Result;
use jsdbg_protocol::{ByteCodeHandle, ProtocolError};
use std::collections::BTreeMap;
use std::fmt;

/// ブレークポイントの参照
///
/// 所有者の関数ハンドルと、関数内のブレークポイント表での位置の組です。
/// 関数が解放されると無効になります。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId {
    pub handle: ByteCodeHandle,
    pub slot: usize,
}

/// 関数内の停止可能な位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub line: u32,
    pub offset: u32,
    /// 有効化されたときに割り当てられた番号
    pub active_index: Option<u32>,
}

/// ターゲットで読み込まれた関数
#[derive(Debug, Clone)]
pub struct SourceFunction {
    pub handle: ByteCodeHandle,
    /// ネストした関数ならtrue、スクリプトのトップレベルならfalse
    pub is_func: bool,
    pub source: Vec<String>,
    pub source_name: String,
    pub name: String,
    pub line: u32,
    pub column: u32,
    breakpoints: Vec<Breakpoint>,
    /// 行番号 → 位置
    lines: BTreeMap<u32, usize>,
    /// オフセット → 位置
    offsets: BTreeMap<u32, usize>,
}

impl SourceFunction {
    /// 構築中のレコードから関数を作成する
    pub(crate) fn from_build(
        handle: ByteCodeHandle,
        is_func: bool,
        build: FunctionBuild,
    ) -> Result<Self> {
        if build.lines.is_empty() {
            return Err(ProtocolError::MissingBreakpoints(handle.0).into());
        }
        if build.lines.len() != build.offsets.len() {
            return Err(ProtocolError::BreakpointTableMismatch {
                handle: handle.0,
                lines: build.lines.len(),
                offsets: build.offsets.len(),
            }
            .into());
        }

        let mut source: Vec<String> = build
            .source
            .replace("\r\n", "\n")
            .split(['\r', '\n'])
            .map(str::to_string)
            .collect();
        if source.len() > 1 && source.last().is_some_and(|l| l.is_empty()) {
            source.pop();
        }

        let mut breakpoints = Vec::with_capacity(build.lines.len());
        let mut lines = BTreeMap::new();
        let mut offsets = BTreeMap::new();
        for (slot, (&line, &offset)) in build.lines.iter().zip(&build.offsets).enumerate() {
            breakpoints.push(Breakpoint {
                line,
                offset,
                active_index: None,
            });
            lines.insert(line, slot);
            offsets.insert(offset, slot);
        }

        Ok(Self {
            handle,
            is_func,
            source,
            source_name: build.source_name,
            name: build.name,
            line: build.line,
            column: build.column,
            breakpoints,
            lines,
            offsets,
        })
    }

    /// 全てのブレークポイント
    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// ブレークポイントの参照を列挙する
    pub fn breakpoint_ids(&self) -> impl Iterator<Item = BreakpointId> + '_ {
        (0..self.breakpoints.len()).map(|slot| BreakpointId {
            handle: self.handle,
            slot,
        })
    }

    pub fn breakpoint(&self, slot: usize) -> Option<&Breakpoint> {
        self.breakpoints.get(slot)
    }

    pub(crate) fn breakpoint_mut(&mut self, slot: usize) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(slot)
    }

    /// 最初のブレークポイント
    pub fn first_breakpoint(&self) -> BreakpointId {
        BreakpointId {
            handle: self.handle,
            slot: 0,
        }
    }

    /// ブレークポイントのある行番号（昇順）
    pub fn breakpoint_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines.keys().copied()
    }

    /// ソースファイル名が指定された名前と一致するか
    ///
    /// 絶対パスと相対パスの違いを許容するため、`/name` や `\name` で終わる場合も一致とみなす。
    pub fn matches_source(&self, name: &str) -> bool {
        let source_name = self.source_name.as_str();
        source_name == name
            || source_name
                .strip_suffix(name)
                .is_some_and(|prefix| prefix.ends_with('/') || prefix.ends_with('\\'))
    }

    /// プログラムカウンタのオフセットを直前のブレークポイントに対応付ける
    ///
    /// 完全一致ならtrueを返す。どのオフセットよりも小さい場合は最初のブレークポイントに丸める。
    pub fn resolve_offset(&self, offset: u32) -> (BreakpointId, bool) {
        if let Some(&slot) = self.offsets.get(&offset) {
            return (
                BreakpointId {
                    handle: self.handle,
                    slot,
                },
                true,
            );
        }

        let slot = self
            .offsets
            .range(..=offset)
            .next_back()
            .map(|(_, &slot)| slot)
            .or_else(|| self.offsets.values().next().copied())
            .unwrap_or(0);

        (
            BreakpointId {
                handle: self.handle,
                slot,
            },
            false,
        )
    }

    /// ブレークポイントの表示用の位置情報
    pub fn location(&self, slot: usize) -> Option<Location> {
        let breakpoint = self.breakpoints.get(slot)?;
        Some(Location {
            handle: self.handle,
            source_name: self.source_name.clone(),
            line: breakpoint.line,
            offset: breakpoint.offset,
            active_index: breakpoint.active_index,
            function: self.is_func.then(|| FunctionPosition {
                name: self.name.clone(),
                line: self.line,
                column: self.column,
            }),
        })
    }
}

/// 関数の定義位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPosition {
    pub name: String,
    pub line: u32,
    pub column: u32,
}

/// ブレークポイントの位置情報のスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub handle: ByteCodeHandle,
    pub source_name: String,
    pub line: u32,
    pub offset: u32,
    pub active_index: Option<u32>,
    /// トップレベルのコードならNone
    pub function: Option<FunctionPosition>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source_name.is_empty() {
            write!(f, "<unknown>:{}", self.line)?;
        } else {
            write!(f, "{}:{}", self.source_name, self.line)?;
        }

        if let Some(function) = &self.function {
            let name = if function.name.is_empty() {
                "function"
            } else {
                function.name.as_str()
            };
            write!(
                f,
                " (in {}() at line:{}, col:{})",
                name, function.line, function.column
            )?;
        }
        Ok(())
    }
}
