//! ブレークポイントの管理
//!
//! 有効なブレークポイントと保留中のブレークポイントは一つのカウンタから
//! 番号を受け取ります。番号は単調増加し、再利用されません。

use crate::function::{BreakpointId, Location};
use crate::registry::FunctionRegistry;
use crate::{DebuggerError, Result};
use jsdbg_protocol::{ByteCodeHandle, ClientMessage};
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

/// `<source>:<line>` 形式
static LINE_SPEC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*):(\d+)$").expect("valid line spec pattern"));

/// ブレークポイントの指定方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointSpec {
    /// `<source>:<line>`
    Line { source: String, line: u32 },
    /// 関数名
    Function(String),
}

impl BreakpointSpec {
    /// 指定文字列を解析する
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(DebuggerError::user("Error: Breakpoint location expected"));
        }

        if let Some(caps) = LINE_SPEC.captures(spec) {
            let line = caps[2]
                .parse::<u32>()
                .map_err(|_| DebuggerError::user("Error: Line number is too large"))?;
            return Ok(BreakpointSpec::Line {
                source: caps[1].to_string(),
                line,
            });
        }

        Ok(BreakpointSpec::Function(spec.to_string()))
    }
}

impl fmt::Display for BreakpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointSpec::Line { source, line } => write!(f, "{}:{}", source, line),
            BreakpointSpec::Function(name) => write!(f, "{}()", name),
        }
    }
}

/// まだ読み込まれていないソースに対するブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBreakpoint {
    pub index: u32,
    pub spec: BreakpointSpec,
}

impl fmt::Display for PendingBreakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.spec)
    }
}

/// 一覧表示用のブレークポイント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointEntry {
    Concrete(Location),
    Pending(PendingBreakpoint),
}

impl BreakpointEntry {
    pub fn index(&self) -> u32 {
        match self {
            BreakpointEntry::Concrete(location) => location.active_index.unwrap_or_default(),
            BreakpointEntry::Pending(pending) => pending.index,
        }
    }
}

impl fmt::Display for BreakpointEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakpointEntry::Concrete(location) => write!(f, " {}: {}", self.index(), location),
            BreakpointEntry::Pending(pending) => {
                write!(f, " {}: {} (pending)", pending.index, pending)
            }
        }
    }
}

/// 削除対象
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Index(u32),
    All,
    Active,
    Pending,
}

/// 削除の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deleted {
    Breakpoint(u32),
    PendingBreakpoint(u32),
    /// `active`、`pending`、`all` による一括削除の件数
    Bulk { active: Option<usize>, pending: Option<usize> },
}

impl fmt::Display for Deleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deleted::Breakpoint(index) => write!(f, "Breakpoint {} deleted", index),
            Deleted::PendingBreakpoint(index) => write!(f, "Pending breakpoint {} deleted", index),
            Deleted::Bulk { active, pending } => {
                let mut lines = Vec::new();
                match active {
                    Some(0) => lines.push("No active breakpoints to delete"),
                    Some(_) => lines.push("All active breakpoints have been deleted"),
                    None => {}
                }
                match pending {
                    Some(0) => lines.push("No pending breakpoints to delete"),
                    Some(_) => lines.push("All pending breakpoints have been deleted"),
                    None => {}
                }
                write!(f, "{}", lines.join("\n"))
            }
        }
    }
}

/// 保留中のブレークポイントが解決された結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPending {
    pub pending: PendingBreakpoint,
    pub locations: Vec<Location>,
}

/// ブレークポイントマネージャ
///
/// ターゲットへ送るべきメッセージは `outbox` に溜め、呼び出し側が
/// [`BreakpointManager::take_outbox`] で取り出して送信します。
#[derive(Debug, Default)]
pub struct BreakpointManager {
    active: BTreeMap<u32, BreakpointId>,
    pending: BTreeMap<u32, PendingBreakpoint>,
    next_index: u32,
    outbox: Vec<ClientMessage>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定に一致する全てのブレークポイントを有効化する
    ///
    /// 一致するものがなければ空のリストを返します。保留中のブレークポイントを
    /// 作成するかどうかは呼び出し側が決めます。
    pub fn set(&mut self, registry: &mut FunctionRegistry, spec: &BreakpointSpec) -> Vec<Location> {
        let targets: Vec<BreakpointId> = match spec {
            BreakpointSpec::Line { source, line } => registry
                .line_index()
                .get(line)
                .iter()
                .copied()
                .filter(|id| {
                    registry
                        .get(id.handle)
                        .is_some_and(|function| function.matches_source(source))
                })
                .collect(),
            BreakpointSpec::Function(name) => {
                let mut functions: Vec<_> = registry
                    .functions()
                    .filter(|function| function.name == *name)
                    .map(|function| (function.line, function.column, function.first_breakpoint()))
                    .collect();
                functions.sort();
                functions.into_iter().map(|(_, _, id)| id).collect()
            }
        };

        targets
            .into_iter()
            .filter_map(|id| self.activate(registry, id))
            .collect()
    }

    /// ブレークポイントを有効化する。既に有効なら何もしない
    pub fn activate(
        &mut self,
        registry: &mut FunctionRegistry,
        id: BreakpointId,
    ) -> Option<Location> {
        let breakpoint = registry.breakpoint_mut(id)?;
        if breakpoint.active_index.is_none() {
            self.next_index += 1;
            breakpoint.active_index = Some(self.next_index);
            self.active.insert(self.next_index, id);
            self.outbox.push(ClientMessage::UpdateBreakpoint {
                enable: true,
                handle: id.handle,
                offset: breakpoint.offset,
            });
            debug!("breakpoint {} enabled at {:?}", self.next_index, id);
        }
        registry.location(id)
    }

    /// 保留中のブレークポイントを作成する
    pub fn add_pending(&mut self, spec: BreakpointSpec) -> Result<PendingBreakpoint> {
        if self.pending.values().any(|pending| pending.spec == spec) {
            return Err(DebuggerError::user("Pending breakpoint already exists"));
        }

        if self.pending.is_empty() {
            self.outbox.push(ClientMessage::ParserConfig { enable: true });
        }

        self.next_index += 1;
        let pending = PendingBreakpoint {
            index: self.next_index,
            spec,
        };
        self.pending.insert(pending.index, pending.clone());
        debug!("pending breakpoint {} added: {}", pending.index, pending);
        Ok(pending)
    }

    /// ブレークポイントを削除する
    pub fn delete(
        &mut self,
        registry: &mut FunctionRegistry,
        target: DeleteTarget,
    ) -> Result<Deleted> {
        match target {
            DeleteTarget::Index(index) => {
                if let Some(id) = self.active.remove(&index) {
                    self.disable(registry, id);
                    return Ok(Deleted::Breakpoint(index));
                }
                if self.pending.remove(&index).is_some() {
                    if self.pending.is_empty() {
                        self.outbox.push(ClientMessage::ParserConfig { enable: false });
                    }
                    return Ok(Deleted::PendingBreakpoint(index));
                }
                Err(DebuggerError::user(format!(
                    "Error: Breakpoint {} not found",
                    index
                )))
            }
            DeleteTarget::Active => Ok(Deleted::Bulk {
                active: Some(self.delete_active(registry)),
                pending: None,
            }),
            DeleteTarget::Pending => Ok(Deleted::Bulk {
                active: None,
                pending: Some(self.delete_pending()),
            }),
            DeleteTarget::All => Ok(Deleted::Bulk {
                active: Some(self.delete_active(registry)),
                pending: Some(self.delete_pending()),
            }),
        }
    }

    fn delete_active(&mut self, registry: &mut FunctionRegistry) -> usize {
        let active = std::mem::take(&mut self.active);
        let count = active.len();
        for id in active.into_values() {
            self.disable(registry, id);
        }
        count
    }

    fn delete_pending(&mut self) -> usize {
        let count = self.pending.len();
        if count > 0 {
            self.pending.clear();
            self.outbox.push(ClientMessage::ParserConfig { enable: false });
        }
        count
    }

    fn disable(&mut self, registry: &mut FunctionRegistry, id: BreakpointId) {
        let Some(breakpoint) = registry.breakpoint_mut(id) else {
            return;
        };
        breakpoint.active_index = None;
        self.outbox.push(ClientMessage::UpdateBreakpoint {
            enable: false,
            handle: id.handle,
            offset: breakpoint.offset,
        });
    }

    /// 解放された関数の有効なブレークポイントを忘れる
    ///
    /// ターゲット側では既に無効なので、無効化の要求は送りません。
    pub fn forget_released(&mut self, indices: &[u32]) {
        for index in indices {
            self.active.remove(index);
        }
    }

    /// 新しく登録された関数に対して保留中のブレークポイントを解決する
    pub fn resolve_pending(
        &mut self,
        registry: &mut FunctionRegistry,
        new_handles: &[ByteCodeHandle],
    ) -> Vec<ResolvedPending> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        let mut resolved = Vec::new();
        let pending: Vec<PendingBreakpoint> = self.pending.values().cloned().collect();
        for breakpoint in pending {
            if let BreakpointSpec::Line { source, line } = &breakpoint.spec {
                let source_lines = new_handles
                    .iter()
                    .filter_map(|handle| registry.get(*handle))
                    .find(|function| function.matches_source(source))
                    .map_or(0, |function| function.source.len());
                if *line as usize > source_lines {
                    continue;
                }
            }

            let locations = self.set(registry, &breakpoint.spec);
            if locations.is_empty() {
                continue;
            }
            debug!("pending breakpoint {} resolved", breakpoint.index);
            self.pending.remove(&breakpoint.index);
            resolved.push(ResolvedPending {
                pending: breakpoint,
                locations,
            });
        }

        if self.pending.is_empty() {
            self.outbox.push(ClientMessage::ParserConfig { enable: false });
        }
        resolved
    }

    /// 送信待ちのメッセージを取り出す
    pub fn take_outbox(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// 有効なブレークポイント（番号順）
    pub fn active(&self) -> impl Iterator<Item = (u32, BreakpointId)> + '_ {
        self.active.iter().map(|(&index, &id)| (index, id))
    }

    /// 保留中のブレークポイント（番号順）
    pub fn pending(&self) -> impl Iterator<Item = &PendingBreakpoint> {
        self.pending.values()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// 全てのブレークポイント（番号順）
    pub fn list(&self, registry: &FunctionRegistry) -> Vec<BreakpointEntry> {
        let mut entries: Vec<BreakpointEntry> = self
            .active
            .values()
            .filter_map(|id| registry.location(*id))
            .map(BreakpointEntry::Concrete)
            .chain(self.pending.values().cloned().map(BreakpointEntry::Pending))
            .collect();
        entries.sort_by_key(BreakpointEntry::index);
        entries
    }
}
