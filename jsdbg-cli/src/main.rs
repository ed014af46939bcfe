//! jsdbg CLI - コマンドラインインターフェース
//!
//! リモートのJavaScriptエンジンに接続するデバッガ jsdbg のREPLインターフェース

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use jsdbg_core::{Action, Channel, Command, Debugger, Dispatch, Event, Reply};
use jsdbg_transport::{RawPacket, TcpProtocol, WebSocket};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// 受信待ちのポーリング間隔
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// jsdbg - JavaScript Remote Debugger
#[derive(Parser)]
#[command(name = "jsdbg")]
#[command(version = "0.1.0")]
#[command(about = "Debugger client for remote JavaScript engines", long_about = None)]
struct Cli {
    /// Address of the debug server (host[:port])
    #[arg(default_value = "localhost:5001")]
    address: String,

    /// Message framing used on the connection
    #[arg(long, value_enum, default_value_t = ChannelKind::Websocket)]
    channel: ChannelKind,

    /// Number of source lines shown around the stop location
    #[arg(long, default_value_t = 0)]
    display: u32,

    /// Stop at exceptions (0 or 1)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    exception: Option<u8>,

    /// JavaScript files sent when the engine waits for a source
    #[arg(long = "client-source", num_args = 1..)]
    client_source: Vec<PathBuf>,

    /// Continue automatically at every stop
    #[arg(long)]
    non_interactive: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChannelKind {
    Websocket,
    Rawpacket,
}

/// プロンプトから戻った後の動作
enum Flow {
    Resume,
    Quit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    println!("jsdbg - JavaScript Remote Debugger");
    println!("Connecting to: {}", cli.address);

    let transport = TcpProtocol::new(&cli.address);
    match cli.channel {
        ChannelKind::Websocket => run(WebSocket::new(transport), &cli),
        ChannelKind::Rawpacket => run(RawPacket::new(transport), &cli),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// 接続してセッションを最後まで実行する
fn run<C: Channel>(channel: C, cli: &Cli) -> Result<()> {
    let mut debugger = Debugger::connect(channel).context("failed to connect")?;
    println!("Connection created!");
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    debugger.set_display(cli.display);
    load_client_sources(&mut debugger, &cli.client_source)?;
    if let Some(enable) = cli.exception {
        if let Dispatch::Prompt(reply) = debugger.dispatch(Command::Exception(enable == 1))? {
            println!("{}", reply);
        }
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let mut editor = DefaultEditor::new()?;
    let result = session_loop(&mut debugger, &mut editor, &interrupted, cli.non_interactive);

    if let Err(e) = debugger.close() {
        debug!("close failed: {}", e);
    }
    result
}

fn load_client_sources<C: Channel>(debugger: &mut Debugger<C>, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if path.extension().and_then(|ext| ext.to_str()) != Some("js") {
            bail!("Error: Javascript file expected: {}", path.display());
        }
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        debugger.queue_client_source(path.display().to_string(), source);
    }
    Ok(())
}

/// メッセージを処理し、停止するたびにプロンプトを出すループ
fn session_loop<C: Channel>(
    debugger: &mut Debugger<C>,
    editor: &mut DefaultEditor,
    interrupted: &AtomicBool,
    non_interactive: bool,
) -> Result<()> {
    loop {
        let action = match debugger.process_messages() {
            Ok(action) => action,
            Err(e) if !e.is_fatal() => {
                println!("{}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match action {
            Action::Wait => {
                if interrupted.swap(false, Ordering::SeqCst) {
                    debug!("interrupt requested, sending stop");
                    debugger.stop()?;
                }
                thread::sleep(POLL_INTERVAL);
            }
            Action::Events(events) => print_events(&events),
            Action::Prompt(events) => {
                print_events(&events);
                interrupted.store(false, Ordering::SeqCst);
                if non_interactive {
                    debugger.dispatch(Command::Continue)?;
                    continue;
                }
                if let Flow::Quit = prompt(debugger, editor)? {
                    println!("Goodbye!");
                    return Ok(());
                }
            }
            Action::End(events) => {
                print_events(&events);
                return Ok(());
            }
        }
    }
}

fn print_events(events: &[Event]) {
    for event in events {
        println!("{}", event);
    }
}

/// ターゲットが停止している間、再開するまでコマンドを受け付ける
fn prompt<C: Channel>(debugger: &mut Debugger<C>, editor: &mut DefaultEditor) -> Result<Flow> {
    loop {
        let line = match editor.readline("(jsdbg) ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                debugger.dispatch(Command::Quit)?;
                return Ok(Flow::Quit);
            }
            Err(err) => return Err(err.into()),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match debugger.dispatch(command) {
            Ok(Dispatch::Prompt(Reply::NotFound(spec))) => {
                println!("{}", Reply::NotFound(spec.clone()));
                if confirm(editor, "Create pending breakpoint? (y or [n]) ") {
                    match debugger.add_pending_breakpoint(spec) {
                        Ok(pending) => {
                            println!("Pending breakpoint {} at {}", pending.index, pending.spec)
                        }
                        Err(e) if !e.is_fatal() => println!("{}", e),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
            Ok(Dispatch::Prompt(Reply::Empty)) => {}
            Ok(Dispatch::Prompt(reply)) => println!("{}", reply),
            Ok(Dispatch::Resume) => return Ok(Flow::Resume),
            Ok(Dispatch::Quit) => return Ok(Flow::Quit),
            Err(e) if !e.is_fatal() => println!("{}", e),
            Err(e) => return Err(e.into()),
        }
    }
}

fn confirm(editor: &mut DefaultEditor, question: &str) -> bool {
    match editor.readline(question) {
        Ok(answer) => matches!(answer.trim(), "y" | "Y" | "yes"),
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => false,
        Err(err) => {
            warn!("readline failed: {}", err);
            false
        }
    }
}
