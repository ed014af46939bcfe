//! スクリプト化したチャネルでデバッガ全体を動かす統合テスト

use jsdbg_core::{
    Action, BreakpointSpec, Channel, Command, Debugger, DebuggerError, Dispatch, Event, Incoming,
    Reply, StopKind,
};
use jsdbg_protocol::{ByteOrder, ProtocolError};
use std::collections::VecDeque;
use std::io;

/// 受信フレームを事前に積んでおき、送信フレームを記録するチャネル
struct ScriptedChannel {
    config: Vec<u8>,
    incoming: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    closed: bool,
}

impl ScriptedChannel {
    fn new(max_message_size: u8) -> Self {
        Self {
            config: vec![1, 1, 9, 0, 0, 0, max_message_size, 2],
            incoming: VecDeque::new(),
            sent: Vec::new(),
            closed: false,
        }
    }
}

impl Channel for ScriptedChannel {
    fn connect(&mut self, config_size: usize) -> io::Result<Vec<u8>> {
        assert_eq!(config_size, self.config.len());
        Ok(self.config.clone())
    }

    fn send_message(&mut self, _byte_order: ByteOrder, payload: &[u8]) -> io::Result<()> {
        self.sent.push(payload.to_vec());
        Ok(())
    }

    fn get_message(&mut self, blocking: bool) -> io::Result<Incoming> {
        Ok(match self.incoming.pop_front() {
            Some(frame) => Incoming::Message(frame),
            None if self.closed || blocking => Incoming::Eof,
            None => Incoming::Empty,
        })
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

fn u32s(message_type: u8, values: &[u32]) -> Vec<u8> {
    let mut frame = vec![message_type];
    for value in values {
        frame.extend_from_slice(&value.to_le_bytes());
    }
    frame
}

fn text(message_type: u8, text: &str) -> Vec<u8> {
    let mut frame = vec![message_type];
    frame.extend_from_slice(text.as_bytes());
    frame
}

fn handle(message_type: u8, handle: u16) -> Vec<u8> {
    let mut frame = vec![message_type];
    frame.extend_from_slice(&handle.to_le_bytes());
    frame
}

fn position(message_type: u8, cp: u16, offset: u32) -> Vec<u8> {
    let mut frame = handle(message_type, cp);
    frame.extend_from_slice(&offset.to_le_bytes());
    frame
}

/// 12行のトップレベルスクリプト `a.js` のパース単位
fn script_unit(cp: u16, lines: &[u32], offsets: &[u32]) -> Vec<Vec<u8>> {
    let source: String = (1..=12).map(|i| format!("var v{} = {};\n", i, i)).collect();
    vec![
        text(8, &source),
        text(10, "/work/a.js"),
        u32s(5, lines),
        u32s(6, offsets),
        handle(3, cp),
    ]
}

fn connect(max_message_size: u8) -> Debugger<ScriptedChannel> {
    Debugger::connect(ScriptedChannel::new(max_message_size)).unwrap()
}

fn push(debugger: &mut Debugger<ScriptedChannel>, frames: Vec<Vec<u8>>) {
    debugger.channel_mut().incoming.extend(frames);
}

fn take_sent(debugger: &mut Debugger<ScriptedChannel>) -> Vec<Vec<u8>> {
    std::mem::take(&mut debugger.channel_mut().sent)
}

/// 行インデックスと有効なブレークポイントの表が登録済みの関数と一致すること
fn assert_consistent(debugger: &Debugger<ScriptedChannel>) {
    let registry = debugger.registry();
    let mut expected = 0;
    for function in registry.functions() {
        for id in function.breakpoint_ids() {
            let breakpoint = function.breakpoint(id.slot).unwrap();
            assert!(registry.line_index().contains(&breakpoint.line, &id));
            expected += 1;
        }
    }
    assert_eq!(registry.line_index().len(), expected);

    for (index, id) in debugger.breakpoints().active() {
        assert_eq!(registry.breakpoint(id).unwrap().active_index, Some(index));
    }
}

#[test]
fn test_rejects_version_mismatch() {
    let mut channel = ScriptedChannel::new(64);
    channel.config[2] = 8;
    let err = Debugger::connect(channel).err().unwrap();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("expected: 9"));
}

#[test]
fn test_pending_breakpoint_resolved_after_parse() {
    let mut debugger = connect(64);
    let spec = BreakpointSpec::parse("a.js:10").unwrap();

    let dispatch = debugger.dispatch(Command::Break(spec.clone())).unwrap();
    assert_eq!(dispatch, Dispatch::Prompt(Reply::NotFound(spec.clone())));
    assert!(take_sent(&mut debugger).is_empty());

    let pending = debugger.add_pending_breakpoint(spec).unwrap();
    assert_eq!(pending.index, 1);
    assert_eq!(take_sent(&mut debugger), vec![vec![4, 1]]);

    let mut frames = script_unit(0x10, &[1, 10], &[4, 20]);
    frames.push(vec![13]);
    push(&mut debugger, frames);

    let Action::Events(events) = debugger.process_messages().unwrap() else {
        panic!("expected resolved pending breakpoint");
    };
    let Event::PendingResolved(resolved) = &events[0] else {
        panic!("unexpected event {:?}", events[0]);
    };
    assert_eq!(resolved.pending.index, 1);
    assert_eq!(resolved.locations[0].line, 10);
    assert_eq!(resolved.locations[0].active_index, Some(2));
    assert_eq!(
        take_sent(&mut debugger),
        vec![vec![2, 1, 0x10, 0, 20, 0, 0, 0], vec![4, 0]]
    );
    assert!(!debugger.breakpoints().has_pending());

    // パース後の待機にはパーサの再開で応える
    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);
    assert_eq!(take_sent(&mut debugger), vec![vec![7]]);

    push(&mut debugger, vec![position(16, 0x10, 20)]);
    let Action::Prompt(events) = debugger.process_messages().unwrap() else {
        panic!("expected a stop");
    };
    assert_eq!(events[0].to_string(), "Stopped at breakpoint:2 /work/a.js:10");
    assert_consistent(&debugger);
}

#[test]
fn test_release_with_active_breakpoint_only_acknowledges() {
    let mut debugger = connect(64);
    push(&mut debugger, script_unit(0x10, &[1, 10], &[4, 20]));
    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);

    let dispatch = debugger
        .dispatch(Command::Break(BreakpointSpec::parse("a.js:10").unwrap()))
        .unwrap();
    assert!(matches!(dispatch, Dispatch::Prompt(Reply::Breakpoints(_))));
    assert_eq!(take_sent(&mut debugger), vec![vec![2, 1, 0x10, 0, 20, 0, 0, 0]]);

    push(&mut debugger, vec![handle(14, 0x10)]);
    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);
    assert_eq!(take_sent(&mut debugger), vec![vec![1, 0x10, 0]]);

    assert!(debugger.registry().is_empty());
    assert!(debugger.registry().line_index().is_empty());
    assert_eq!(debugger.breakpoints().active().count(), 0);
    assert_eq!(
        debugger.dispatch(Command::List).unwrap(),
        Dispatch::Prompt(Reply::List(Vec::new()))
    );
}

#[test]
fn test_release_of_staged_function_during_parse() {
    let mut debugger = connect(64);
    push(
        &mut debugger,
        vec![
            text(8, "function f() {}\nf();\n"),
            text(10, "b.js"),
            text(12, "f"),
            u32s(4, &[1, 1]),
            u32s(5, &[1]),
            u32s(6, &[3]),
            handle(3, 5),
            handle(14, 5),
            u32s(5, &[2]),
            u32s(6, &[8]),
            handle(3, 6),
        ],
    );

    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);
    assert_eq!(take_sent(&mut debugger), vec![vec![1, 5, 0]]);
    assert_eq!(debugger.registry().len(), 1);
    assert!(debugger.registry().get(jsdbg_core::ByteCodeHandle(6)).is_some());
    assert_consistent(&debugger);
}

#[test]
fn test_parse_error_discards_unit() {
    let mut debugger = connect(64);
    push(&mut debugger, vec![text(8, "var = ;"), text(10, "bad.js"), vec![2]]);

    let err = debugger.process_messages().unwrap_err();
    assert!(matches!(err, DebuggerError::Parse));
    assert!(!err.is_fatal());
    assert!(debugger.registry().is_empty());

    push(&mut debugger, script_unit(0x20, &[1], &[0]));
    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);
    assert_eq!(debugger.registry().len(), 1);
}

#[test]
fn test_eval_is_fragmented_and_result_reassembled() {
    let mut debugger = connect(16);
    let dispatch = debugger
        .dispatch(Command::parse(&format!("eval {}", "a".repeat(35))).unwrap().unwrap())
        .unwrap();
    assert_eq!(dispatch, Dispatch::Resume);

    let sent = take_sent(&mut debugger);
    let lengths: Vec<usize> = sent.iter().map(Vec::len).collect();
    assert_eq!(lengths, vec![16, 16, 15]);
    assert_eq!(&sent[0][..10], &[17, 40, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(sent[1][0], 18);
    assert_eq!(sent[2][0], 18);

    let mut last = text(24, "c");
    last.push(2);
    push(&mut debugger, vec![text(23, "ab"), last]);
    let Action::Prompt(events) = debugger.process_messages().unwrap() else {
        panic!("expected eval result");
    };
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to_string(), "Uncaught exception: abc");
}

#[test]
fn test_backtrace_and_exception_hint() {
    let mut debugger = connect(64);
    push(&mut debugger, script_unit(0x10, &[1, 5, 9], &[5, 10, 20]));
    debugger.process_messages().unwrap();

    push(&mut debugger, vec![text(19, "ReferenceError"), position(17, 0x10, 12)]);
    let Action::Prompt(events) = debugger.process_messages().unwrap() else {
        panic!("expected an exception stop");
    };
    let Event::Stop(stop) = &events[0] else {
        panic!("unexpected event {:?}", events[0]);
    };
    assert!(!stop.exact);
    assert_eq!(stop.location.line, 5);
    assert_eq!(
        stop.kind,
        StopKind::Exception {
            hint: Some("ReferenceError".to_string())
        }
    );

    let dispatch = debugger.dispatch(Command::parse("bt 1 4 t").unwrap().unwrap()).unwrap();
    assert_eq!(dispatch, Dispatch::Resume);
    assert_eq!(
        take_sent(&mut debugger),
        vec![vec![16, 1, 0, 0, 0, 4, 0, 0, 0, 1]]
    );

    let mut frames = position(21, 0x10, 2);
    frames.extend_from_slice(&position(22, 0x10, 20)[1..]);
    frames[0] = 22;
    push(&mut debugger, vec![u32s(20, &[3]), frames]);
    let Action::Prompt(events) = debugger.process_messages().unwrap() else {
        panic!("expected a backtrace");
    };
    assert_eq!(events[0], Event::BacktraceTotal(3));
    assert_eq!(
        events[1].to_string(),
        "Frame 1: /work/a.js:1\nFrame 2: /work/a.js:9"
    );
}

#[test]
fn test_output_is_flushed_on_close() {
    let mut debugger = connect(64);
    let mut frame = text(27, "hi\npar");
    frame.push(1);
    push(&mut debugger, vec![frame]);

    let Action::Events(events) = debugger.process_messages().unwrap() else {
        panic!("expected output");
    };
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to_string(), "out: hi");

    push(&mut debugger, vec![vec![32]]);
    let Action::End(events) = debugger.process_messages().unwrap() else {
        panic!("expected the end of the session");
    };
    assert_eq!(events[0].to_string(), "out: par");
    assert_eq!(events[1], Event::Closed);
}

#[test]
fn test_output_is_flushed_when_closed_mid_message() {
    let mut debugger = connect(64);
    let mut frame = text(27, "par");
    frame.push(1);
    push(&mut debugger, vec![frame, text(7, "var a")]);

    let Action::End(events) = debugger.process_messages().unwrap() else {
        panic!("expected the end of the session");
    };
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].to_string(), "out: par");
    assert_eq!(events[1], Event::Closed);
}

#[test]
fn test_pending_function_breakpoint_resolved_after_parse() {
    let mut debugger = connect(64);
    let spec = BreakpointSpec::parse("h").unwrap();
    assert_eq!(
        debugger.dispatch(Command::Break(spec.clone())).unwrap(),
        Dispatch::Prompt(Reply::NotFound(spec.clone()))
    );
    debugger.add_pending_breakpoint(spec).unwrap();
    assert_eq!(take_sent(&mut debugger), vec![vec![4, 1]]);

    push(
        &mut debugger,
        vec![
            text(8, "function h() {}\nh();\n"),
            text(10, "c.js"),
            text(12, "h"),
            u32s(4, &[1, 1]),
            u32s(5, &[1]),
            u32s(6, &[3]),
            handle(3, 5),
            u32s(5, &[2]),
            u32s(6, &[8]),
            handle(3, 6),
        ],
    );

    let Action::Events(events) = debugger.process_messages().unwrap() else {
        panic!("expected resolved pending breakpoint");
    };
    let Event::PendingResolved(resolved) = &events[0] else {
        panic!("unexpected event {:?}", events[0]);
    };
    assert_eq!(resolved.locations.len(), 1);
    assert_eq!(resolved.locations[0].handle, jsdbg_core::ByteCodeHandle(5));
    assert_eq!(
        take_sent(&mut debugger),
        vec![vec![2, 1, 5, 0, 3, 0, 0, 0], vec![4, 0]]
    );
    assert!(!debugger.breakpoints().has_pending());
    assert_consistent(&debugger);
}

#[test]
fn test_release_of_live_function_during_parse() {
    let mut debugger = connect(64);
    push(&mut debugger, script_unit(0x10, &[1, 10], &[4, 20]));
    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);
    debugger
        .dispatch(Command::Break(BreakpointSpec::parse("a.js:10").unwrap()))
        .unwrap();
    take_sent(&mut debugger);

    push(
        &mut debugger,
        vec![
            text(8, "print(2);\n"),
            text(10, "b.js"),
            handle(14, 0x10),
            u32s(5, &[1]),
            u32s(6, &[0]),
            handle(3, 0x20),
        ],
    );
    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);

    assert_eq!(take_sent(&mut debugger), vec![vec![1, 0x10, 0]]);
    assert!(!debugger.registry().contains(jsdbg_core::ByteCodeHandle(0x10)));
    assert!(debugger.registry().contains(jsdbg_core::ByteCodeHandle(0x20)));
    assert_eq!(debugger.breakpoints().active().count(), 0);
    assert_consistent(&debugger);
}

#[test]
fn test_foreign_frame_inside_multipart_is_fatal() {
    let mut debugger = connect(64);
    push(&mut debugger, vec![text(23, "ab"), text(26, "x")]);

    let err = debugger.process_messages().unwrap_err();
    assert!(matches!(
        err,
        DebuggerError::Protocol(ProtocolError::UnexpectedFrame { found: 26, .. })
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_client_source_upload() {
    let mut debugger = connect(64);
    debugger.queue_client_source("main.js", "print(1)");
    push(&mut debugger, vec![vec![25], vec![25]]);

    let Action::Events(events) = debugger.process_messages().unwrap() else {
        panic!("expected the source to be sent");
    };
    assert_eq!(events, vec![Event::SourceSent("main.js".to_string())]);
    let sent = take_sent(&mut debugger);
    assert_eq!(sent[0][0], 8);
    assert!(sent[0].ends_with(b"main.js\0print(1)"));

    assert_eq!(debugger.process_messages().unwrap(), Action::Wait);
    assert_eq!(take_sent(&mut debugger), vec![vec![10]]);
}

#[test]
fn test_quit_continues_target() {
    let mut debugger = connect(64);
    assert_eq!(debugger.dispatch(Command::Quit).unwrap(), Dispatch::Quit);
    assert_eq!(take_sent(&mut debugger), vec![vec![12]]);
}
