//! デバッガコマンド

use crate::breakpoint::{BreakpointSpec, DeleteTarget};
use crate::parse::{parse_delete_target, parse_level, parse_number, parse_toggle, BacktraceRequest};
use crate::{DebuggerError, Result};
use jsdbg_protocol::EvalKind;

/// デバッガコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ブレークポイントを設定
    Break(BreakpointSpec),
    /// ブレークポイント一覧
    List,
    /// ブレークポイントを削除
    Delete(DeleteTarget),
    /// 実行継続
    Continue,
    /// ステップ実行
    Step,
    /// 次の行へ
    Next,
    /// 現在の関数から抜けるまで実行
    Finish,
    /// 実行中のスクリプトを停止
    Stop,
    /// バックトレース表示
    Backtrace(BacktraceRequest),
    /// 式の評価（throw/abortを含む）
    Eval {
        kind: EvalKind,
        level: u32,
        code: String,
    },
    /// 例外発生時に停止するかどうか
    Exception(bool),
    /// メモリ統計
    Memstats,
    /// スコープチェーン表示
    Scopes,
    /// 指定レベルのスコープの変数表示
    Variables(u32),
    /// 停止位置の前後の行を表示。0なら関数のソース全体
    Source(u32),
    /// 停止時に表示するソースの行数を設定
    Display(u32),
    /// 読み込み済みの関数一覧
    Dump,
    /// エンジンのコンテキストをリセット
    Restart,
    /// ヘルプ表示
    Help,
    /// 終了
    Quit,
}

impl Command {
    /// コマンド文字列をパースする
    ///
    /// 空行ならNoneを返します。
    pub fn parse(input: &str) -> Result<Option<Self>> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }

        let (name, args) = match input.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (input, ""),
        };

        let command = match name {
            "break" | "b" => Command::Break(BreakpointSpec::parse(args)?),
            "list" => Command::List,
            "delete" | "d" => Command::Delete(parse_delete_target(args)?),
            "continue" | "c" => Command::Continue,
            "step" | "s" => Command::Step,
            "next" | "n" => Command::Next,
            "finish" | "f" => Command::Finish,
            "stop" => Command::Stop,
            "backtrace" | "bt" => Command::Backtrace(BacktraceRequest::parse(args)?),
            "eval" | "e" => Command::Eval {
                kind: EvalKind::Eval,
                level: 0,
                code: expression(args)?,
            },
            "eval_at" => {
                let (level, code) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
                Command::Eval {
                    kind: EvalKind::Eval,
                    level: parse_level(level)?,
                    code: expression(code)?,
                }
            }
            "throw" => Command::Eval {
                kind: EvalKind::Throw,
                level: 0,
                code: expression(args)?,
            },
            "abort" => Command::Eval {
                kind: EvalKind::Abort,
                level: 0,
                code: expression(args)?,
            },
            "exception" => Command::Exception(parse_toggle(args)?),
            "memstats" | "ms" => Command::Memstats,
            "scopes" => Command::Scopes,
            "variables" => Command::Variables(parse_level(args)?),
            "source" | "src" if args.is_empty() => Command::Source(0),
            "source" | "src" => Command::Source(non_negative(args)?),
            "display" => Command::Display(non_negative(args)?),
            "dump" => Command::Dump,
            "restart" => Command::Restart,
            "help" | "h" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            _ => return Err(DebuggerError::user(format!("Unknown command: {}", name))),
        };

        Ok(Some(command))
    }
}

fn expression(args: &str) -> Result<String> {
    let code = args.trim();
    if code.is_empty() {
        return Err(DebuggerError::user("Error: Expression expected"));
    }
    Ok(code.to_string())
}

fn non_negative(args: &str) -> Result<u32> {
    parse_number(args)
        .ok_or_else(|| DebuggerError::user("Error: Non negative integer number expected"))
}

/// ヘルプメッセージ
pub const HELP: &str = "\
Available commands:
  break, b <file:line|function>   Set a breakpoint
  list                            List breakpoints
  delete, d <index|all|active|pending>
                                  Delete breakpoints
  continue, c                     Continue execution
  step, s                         Step into
  next, n                         Step over
  finish, f                       Run until the current function returns
  stop                            Stop the running script
  backtrace, bt [min] [max] [t]   Show the call stack
  eval, e <expr>                  Evaluate an expression
  eval_at <level> <expr>          Evaluate an expression in a scope level
  throw <expr>                    Throw the value of an expression
  abort <expr>                    Abort the script with the value of an expression
  exception <0|1>                 Stop on exceptions
  memstats, ms                    Show memory statistics
  scopes                          Show the scope chain
  variables [level]               Show the variables of a scope
  source, src [lines]             Show the source around the stop location
  display <lines>                 Set the source lines shown at every stop
  dump                            List loaded functions
  restart                         Reset the engine context
  help, h, ?                      Show this help
  quit, q, exit                   Exit the debugger";
