//! クライアントからサーバ（ターゲット）へのメッセージのエンコード

use crate::codec::fragment;
use crate::{ByteCodeHandle, ClientMessageType, EvalKind, SessionConfig};

/// クライアントメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// バイトコードの解放を承認する
    FreeByteCodeCp(ByteCodeHandle),
    /// ブレークポイントの有効/無効を切り替える
    UpdateBreakpoint {
        enable: bool,
        handle: ByteCodeHandle,
        offset: u32,
    },
    /// 例外発生時に停止するかどうか
    ExceptionConfig { enable: bool },
    /// パース完了ごとに停止するかどうか
    ParserConfig { enable: bool },
    Memstats,
    Stop,
    ParserResume,
    /// クライアント側のソースファイルを送る
    ClientSource { name: String, source: String },
    NoMoreSources,
    ContextReset,
    Continue,
    Step,
    Next,
    Finish,
    GetBacktrace {
        min_depth: u32,
        max_depth: u32,
        get_total: bool,
    },
    /// スコープチェーンの `level` でコードを評価する
    Eval {
        kind: EvalKind,
        level: u32,
        code: String,
    },
    GetScopeChain,
    GetScopeVariables { level: u32 },
}

impl ClientMessage {
    /// メッセージ型
    pub fn message_type(&self) -> ClientMessageType {
        use ClientMessageType as T;
        match self {
            ClientMessage::FreeByteCodeCp(_) => T::FreeByteCodeCp,
            ClientMessage::UpdateBreakpoint { .. } => T::UpdateBreakpoint,
            ClientMessage::ExceptionConfig { .. } => T::ExceptionConfig,
            ClientMessage::ParserConfig { .. } => T::ParserConfig,
            ClientMessage::Memstats => T::Memstats,
            ClientMessage::Stop => T::Stop,
            ClientMessage::ParserResume => T::ParserResume,
            ClientMessage::ClientSource { .. } => T::ClientSource,
            ClientMessage::NoMoreSources => T::NoMoreSources,
            ClientMessage::ContextReset => T::ContextReset,
            ClientMessage::Continue => T::Continue,
            ClientMessage::Step => T::Step,
            ClientMessage::Next => T::Next,
            ClientMessage::Finish => T::Finish,
            ClientMessage::GetBacktrace { .. } => T::GetBacktrace,
            ClientMessage::Eval { .. } => T::Eval,
            ClientMessage::GetScopeChain => T::GetScopeChain,
            ClientMessage::GetScopeVariables { .. } => T::GetScopeVariables,
        }
    }

    /// 送信フレーム列にエンコードする
    ///
    /// 文字列を運ぶメッセージは最大メッセージサイズに合わせて分割されます。
    /// それ以外は常に1フレームです。
    pub fn encode(&self, config: &SessionConfig) -> Vec<Vec<u8>> {
        let message_type = self.message_type();
        let order = config.byte_order;
        let mut frame = vec![message_type.as_u8()];

        match self {
            ClientMessage::FreeByteCodeCp(handle) => config.write_handle(&mut frame, *handle),
            ClientMessage::UpdateBreakpoint {
                enable,
                handle,
                offset,
            } => {
                frame.push(u8::from(*enable));
                config.write_handle(&mut frame, *handle);
                order.write_u32(&mut frame, *offset);
            }
            ClientMessage::ExceptionConfig { enable } | ClientMessage::ParserConfig { enable } => {
                frame.push(u8::from(*enable));
            }
            ClientMessage::GetBacktrace {
                min_depth,
                max_depth,
                get_total,
            } => {
                order.write_u32(&mut frame, *min_depth);
                order.write_u32(&mut frame, *max_depth);
                frame.push(u8::from(*get_total));
            }
            ClientMessage::GetScopeVariables { level } => order.write_u32(&mut frame, *level),
            ClientMessage::ClientSource { name, source } => {
                let mut payload = Vec::with_capacity(name.len() + 1 + source.len());
                payload.extend_from_slice(name.as_bytes());
                payload.push(0);
                payload.extend_from_slice(source.as_bytes());
                return fragment(config, message_type, &payload);
            }
            ClientMessage::Eval { kind, level, code } => {
                let mut payload = Vec::with_capacity(4 + 1 + code.len());
                order.write_u32(&mut payload, *level);
                payload.push(kind.as_u8());
                payload.extend_from_slice(code.as_bytes());
                return fragment(config, message_type, &payload);
            }
            ClientMessage::Memstats
            | ClientMessage::Stop
            | ClientMessage::ParserResume
            | ClientMessage::NoMoreSources
            | ClientMessage::ContextReset
            | ClientMessage::Continue
            | ClientMessage::Step
            | ClientMessage::Next
            | ClientMessage::Finish
            | ClientMessage::GetScopeChain => {}
        }

        vec![frame]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ByteOrder, PointerSize, PROTOCOL_VERSION};

    fn config(byte_order: ByteOrder, pointer_size: PointerSize) -> SessionConfig {
        SessionConfig {
            byte_order,
            pointer_size,
            max_message_size: 16,
            version: PROTOCOL_VERSION,
        }
    }

    #[test]
    fn test_update_breakpoint_layout() {
        let message = ClientMessage::UpdateBreakpoint {
            enable: true,
            handle: ByteCodeHandle(0x0102),
            offset: 0x10,
        };
        assert_eq!(
            message.encode(&config(ByteOrder::Little, PointerSize::Two)),
            vec![vec![2, 1, 0x02, 0x01, 0x10, 0, 0, 0]]
        );
        assert_eq!(
            message.encode(&config(ByteOrder::Big, PointerSize::Four)),
            vec![vec![2, 1, 0, 0, 0x01, 0x02, 0, 0, 0, 0x10]]
        );
    }

    #[test]
    fn test_fixed_layouts() {
        let cfg = config(ByteOrder::Little, PointerSize::Two);
        assert_eq!(ClientMessage::Continue.encode(&cfg), vec![vec![12]]);
        assert_eq!(
            ClientMessage::ParserConfig { enable: false }.encode(&cfg),
            vec![vec![4, 0]]
        );
        assert_eq!(
            ClientMessage::GetBacktrace {
                min_depth: 1,
                max_depth: 3,
                get_total: true
            }
            .encode(&cfg),
            vec![vec![16, 1, 0, 0, 0, 3, 0, 0, 0, 1]]
        );
        assert_eq!(
            ClientMessage::GetScopeVariables { level: 2 }.encode(&cfg),
            vec![vec![20, 2, 0, 0, 0]]
        );
        assert_eq!(
            ClientMessage::FreeByteCodeCp(ByteCodeHandle(5)).encode(&cfg),
            vec![vec![1, 5, 0]]
        );
    }

    #[test]
    fn test_eval_is_prefixed_and_fragmented() {
        let cfg = config(ByteOrder::Little, PointerSize::Two);
        // 4バイトのスコープ番号 + 1バイトのサブオペコード + 35バイトのコード = 40バイト
        let code = "a".repeat(35);
        let frames = ClientMessage::Eval {
            kind: EvalKind::Throw,
            level: 0,
            code,
        }
        .encode(&cfg);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 16);
        assert_eq!(frames[1].len(), 16);
        assert_eq!(frames[2].len(), 15);
        assert_eq!(&frames[0][1..5], &40u32.to_le_bytes());
        assert_eq!(&frames[0][5..9], &0u32.to_le_bytes());
        assert_eq!(frames[0][9], EvalKind::Throw.as_u8());
    }

    #[test]
    fn test_client_source_payload() {
        let cfg = config(ByteOrder::Little, PointerSize::Two);
        let frames = ClientMessage::ClientSource {
            name: "a.js".to_string(),
            source: "x".to_string(),
        }
        .encode(&cfg);
        assert_eq!(frames, vec![vec![8, 6, 0, 0, 0, b'a', b'.', b'j', b's', 0, b'x']]);
    }
}
