//! jsdbg デバッガのコア機能
//!
//! このクレートは、リモートのJavaScriptエンジンを操作するデバッガの中核となるロジックを提供します。
//! ソースのパースイベントから関数とブレークポイントの表を組み立て、ブレークポイントの
//! 有効化や実行時イベントの再構築を行います。トランスポートは [`jsdbg_protocol::Channel`]
//! を通じて注入します。

pub mod breakpoint;
pub mod command;
pub mod debugger;
pub mod errors;
pub mod events;
pub mod function;
pub mod multimap;
pub mod parse;
pub mod parser;
pub mod registry;
pub mod reply;

pub use breakpoint::{
    BreakpointEntry, BreakpointManager, BreakpointSpec, DeleteTarget, Deleted, PendingBreakpoint,
    ResolvedPending,
};
pub use command::Command;
pub use debugger::{Action, ClientSource, Debugger, Dispatch};
pub use errors::DebuggerError;
pub use events::{Event, OutputKind, OutputRecord, SourceListing, Stop, StopKind};
pub use function::{Breakpoint, BreakpointId, Location, SourceFunction};
pub use multimap::Multimap;
pub use parser::{ParserState, SourceParser};
pub use registry::{FunctionRegistry, Merged};
pub use reply::{FunctionSummary, Reply};

// 他のクレートから使用するために再エクスポート
pub use jsdbg_protocol::{ByteCodeHandle, Channel, Incoming, SessionConfig};

/// デバッガの結果型
pub type Result<T> = std::result::Result<T, DebuggerError>;
