//! 読み込み済み関数のレジストリと行インデックス

use crate::function::{Breakpoint, BreakpointId, Location, SourceFunction};
use crate::multimap::Multimap;
use crate::Result;
use jsdbg_protocol::{ByteCodeHandle, CodePosition, ProtocolError};
use std::collections::HashMap;
use tracing::{debug, warn};

/// 登録の結果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Merged {
    /// 登録したハンドル（定義順）
    pub handles: Vec<ByteCodeHandle>,
    /// 置き換えられた関数で有効だったブレークポイントの番号
    pub replaced: Vec<u32>,
}

/// ハンドル → 関数のマップと、行番号 → ブレークポイントのインデックス
///
/// 登録済みの全関数の全ブレークポイントが、その行番号のキーの下に一度だけ現れます。
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<ByteCodeHandle, SourceFunction>,
    line_index: Multimap<u32, BreakpointId>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// パース単位で確定した関数を登録する
    pub fn merge(&mut self, staged: Vec<SourceFunction>) -> Merged {
        let mut merged = Merged::default();
        for function in staged {
            let handle = function.handle;
            if let Some(old) = self.functions.get(&handle) {
                // 解放されずに再利用されたハンドル
                warn!("handle {} reused without release", handle);
                merged.replaced.extend(old.breakpoints().iter().filter_map(|b| b.active_index));
                self.unindex(handle);
            }
            for id in function.breakpoint_ids() {
                if let Some(breakpoint) = function.breakpoint(id.slot) {
                    self.line_index.insert(breakpoint.line, id);
                }
            }
            debug!(
                "registered function {} ({}:{})",
                handle, function.source_name, function.line
            );
            self.functions.insert(handle, function);
            merged.handles.push(handle);
        }
        merged
    }

    /// 関数を登録解除し、有効だったブレークポイントの番号を返す
    pub fn release(&mut self, handle: ByteCodeHandle) -> Result<Vec<u32>> {
        let function = self
            .functions
            .get(&handle)
            .ok_or(ProtocolError::UnknownHandle(handle.0))?;
        let released = function
            .breakpoints()
            .iter()
            .filter_map(|b| b.active_index)
            .collect();

        self.unindex(handle);
        self.functions.remove(&handle);
        debug!("released function {}", handle);
        Ok(released)
    }

    fn unindex(&mut self, handle: ByteCodeHandle) {
        let Some(function) = self.functions.get(&handle) else {
            return;
        };
        for id in function.breakpoint_ids() {
            if let Some(breakpoint) = function.breakpoint(id.slot) {
                self.line_index.remove_one(&breakpoint.line, &id);
            }
        }
    }

    pub fn get(&self, handle: ByteCodeHandle) -> Option<&SourceFunction> {
        self.functions.get(&handle)
    }

    pub fn contains(&self, handle: ByteCodeHandle) -> bool {
        self.functions.contains_key(&handle)
    }

    /// 全ての関数（順序は不定）
    pub fn functions(&self) -> impl Iterator<Item = &SourceFunction> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.functions.get(&id.handle)?.breakpoint(id.slot)
    }

    pub(crate) fn breakpoint_mut(&mut self, id: BreakpointId) -> Option<&mut Breakpoint> {
        self.functions.get_mut(&id.handle)?.breakpoint_mut(id.slot)
    }

    pub fn location(&self, id: BreakpointId) -> Option<Location> {
        self.functions.get(&id.handle)?.location(id.slot)
    }

    /// 実行位置をブレークポイントに対応付ける
    ///
    /// オフセットが完全一致したかどうかも返します。
    pub fn resolve(&self, position: CodePosition) -> Result<(BreakpointId, bool)> {
        let function = self
            .functions
            .get(&position.handle)
            .ok_or(ProtocolError::UnknownHandle(position.handle.0))?;
        Ok(function.resolve_offset(position.offset))
    }

    /// 行番号 → ブレークポイントのインデックス
    pub fn line_index(&self) -> &Multimap<u32, BreakpointId> {
        &self.line_index
    }
}
