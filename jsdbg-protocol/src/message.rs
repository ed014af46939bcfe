//! メッセージ型とサブタイプの定義
//!
//! 通信方向ごとに閉じた列挙型を一つずつ持ちます。値はワイヤ上の1バイトそのものです。

/// 整数値と相互変換できるワイヤ列挙型を定義するマクロ
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl $name {
            /// ワイヤ上の値から変換する
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// ワイヤ上の値を取得する
            pub fn as_u8(self) -> u8 {
                self as u8
            }
        }
    };
}

wire_enum! {
    /// サーバ（ターゲット）からクライアントへのメッセージ型
    pub enum ServerMessageType {
        Configuration = 1,
        ParseError = 2,
        ByteCodeCp = 3,
        ParseFunction = 4,
        BreakpointList = 5,
        BreakpointOffsetList = 6,
        SourceCode = 7,
        SourceCodeEnd = 8,
        SourceCodeName = 9,
        SourceCodeNameEnd = 10,
        FunctionName = 11,
        FunctionNameEnd = 12,
        WaitingAfterParse = 13,
        ReleaseByteCodeCp = 14,
        MemstatsReceive = 15,
        BreakpointHit = 16,
        ExceptionHit = 17,
        ExceptionStr = 18,
        ExceptionStrEnd = 19,
        BacktraceTotal = 20,
        Backtrace = 21,
        BacktraceEnd = 22,
        EvalResult = 23,
        EvalResultEnd = 24,
        WaitForSource = 25,
        OutputResult = 26,
        OutputResultEnd = 27,
        ScopeChain = 28,
        ScopeChainEnd = 29,
        ScopeVariables = 30,
        ScopeVariablesEnd = 31,
        CloseConnection = 32,
    }
}

impl ServerMessageType {
    /// 分割されたメッセージの終端型（常に基本型+1）
    pub fn end_type(self) -> Option<Self> {
        match self {
            Self::SourceCode
            | Self::SourceCodeName
            | Self::FunctionName
            | Self::ExceptionStr
            | Self::Backtrace
            | Self::EvalResult
            | Self::OutputResult
            | Self::ScopeChain
            | Self::ScopeVariables => Self::from_u8(self.as_u8() + 1),
            _ => None,
        }
    }
}

wire_enum! {
    /// クライアントからサーバ（ターゲット）へのメッセージ型
    pub enum ClientMessageType {
        FreeByteCodeCp = 1,
        UpdateBreakpoint = 2,
        ExceptionConfig = 3,
        ParserConfig = 4,
        Memstats = 5,
        Stop = 6,
        ParserResume = 7,
        ClientSource = 8,
        ClientSourcePart = 9,
        NoMoreSources = 10,
        ContextReset = 11,
        Continue = 12,
        Step = 13,
        Next = 14,
        Finish = 15,
        GetBacktrace = 16,
        Eval = 17,
        EvalPart = 18,
        GetScopeChain = 19,
        GetScopeVariables = 20,
    }
}

wire_enum! {
    /// evalメッセージのサブオペコード
    pub enum EvalKind {
        /// 式を評価する
        Eval = 0,
        /// 式の値を例外として送出する
        Throw = 1,
        /// 式の値でスクリプトを中断する
        Abort = 2,
    }
}

wire_enum! {
    /// eval結果のサブタイプ
    pub enum EvalSubtype {
        Ok = 1,
        Error = 2,
    }
}

wire_enum! {
    /// 出力結果のサブタイプ
    pub enum OutputSubtype {
        Ok = 1,
        Error = 2,
        Warning = 3,
        Debug = 4,
        Trace = 5,
    }
}

wire_enum! {
    /// スコープチェーンの要素
    pub enum ScopeKind {
        With = 1,
        Local = 2,
        Closure = 3,
        Global = 4,
        /// 現状はcatchブロックのみ
        NonClosure = 5,
    }
}

impl ScopeKind {
    /// 表示名
    pub fn name(self) -> &'static str {
        match self {
            Self::With => "with",
            Self::Local => "local",
            Self::Closure => "closure",
            Self::Global => "global",
            Self::NonClosure => "catch",
        }
    }
}

wire_enum! {
    /// スコープ変数の値の型
    pub enum ValueType {
        None = 1,
        Undefined = 2,
        Null = 3,
        Boolean = 4,
        Number = 5,
        String = 6,
        Function = 7,
        Array = 8,
        Object = 9,
    }
}

impl ValueType {
    /// 表示用の型名
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Undefined => "undefined",
            Self::Null => "Null",
            Self::Boolean => "Boolean",
            Self::Number => "Number",
            Self::String => "String",
            Self::Function => "Function",
            Self::Array => "Array",
            Self::Object => "Object",
        }
    }
}
