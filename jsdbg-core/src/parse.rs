//! コマンド引数のパース関連のユーティリティ関数

use crate::breakpoint::DeleteTarget;
use crate::{DebuggerError, Result};

/// 数値文字列をu32にパース
///
/// 16進数（0xプレフィックス付き）または10進数をサポート
///
/// # Examples
/// ```
/// use jsdbg_core::parse::parse_number;
///
/// assert_eq!(parse_number("0x10"), Some(16));
/// assert_eq!(parse_number("12"), Some(12));
/// assert_eq!(parse_number("-1"), None);
/// ```
pub fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();

    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse::<u32>().ok()
    }
}

/// ブレークポイント番号をパース
pub fn parse_index(s: &str) -> Result<u32> {
    parse_number(s).ok_or_else(|| DebuggerError::user("Error: Integer number expected"))
}

/// スコープチェーンのレベルをパース。省略時は0
pub fn parse_level(s: &str) -> Result<u32> {
    if s.trim().is_empty() {
        return Ok(0);
    }
    parse_number(s)
        .ok_or_else(|| DebuggerError::user("Error: Non negative integer number expected"))
}

/// 0か1をパース
pub fn parse_toggle(s: &str) -> Result<bool> {
    match s.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(DebuggerError::user("Error: 0 or 1 expected")),
    }
}

/// `delete` の引数をパース
pub fn parse_delete_target(s: &str) -> Result<DeleteTarget> {
    match s.trim() {
        "" => Err(DebuggerError::user("Error: Breakpoint index expected")),
        "all" => Ok(DeleteTarget::All),
        "active" => Ok(DeleteTarget::Active),
        "pending" => Ok(DeleteTarget::Pending),
        index => parse_index(index).map(DeleteTarget::Index),
    }
}

/// バックトレースの要求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BacktraceRequest {
    pub min_depth: u32,
    /// 0なら上限なし
    pub max_depth: u32,
    /// フレームの総数も要求する
    pub get_total: bool,
}

impl BacktraceRequest {
    /// `[min] [max] [t]` をパース。引数が1つならそれが最大深さ
    pub fn parse(args: &str) -> Result<Self> {
        let mut request = Self::default();
        let mut numbers = Vec::new();
        for arg in args.split_whitespace() {
            if arg == "t" {
                request.get_total = true;
            } else {
                numbers.push(arg);
            }
        }

        let positive = || DebuggerError::user("Error: Positive integer number expected");
        let number = |s: &str| -> Result<i64> {
            s.parse::<i64>().map_err(|e| {
                DebuggerError::user(format!("Error: Positive integer number expected, {}", e))
            })
        };

        match numbers.as_slice() {
            [] => {}
            [max] => {
                let max = number(max)?;
                if max <= 0 {
                    return Err(positive());
                }
                request.max_depth = u32::try_from(max).map_err(|_| positive())?;
            }
            [min, max, ..] => {
                let (min, max) = (number(min)?, number(max)?);
                if max <= 0 || min < 0 {
                    return Err(positive());
                }
                if min > max {
                    return Err(DebuggerError::user(
                        "Error: Start depth needs to be lower than or equal to max depth",
                    ));
                }
                request.min_depth = u32::try_from(min).map_err(|_| positive())?;
                request.max_depth = u32::try_from(max).map_err(|_| positive())?;
            }
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x1f"), Some(0x1f));
        assert_eq!(parse_number("0X1F"), Some(0x1f));
        assert_eq!(parse_number(" 42 "), Some(42));
        assert_eq!(parse_number("xyz"), None);
        assert_eq!(parse_number("0xghij"), None);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("").unwrap(), 0);
        assert_eq!(parse_level("3").unwrap(), 3);
        assert!(parse_level("-1").is_err());
    }

    #[test]
    fn test_parse_delete_target() {
        assert_eq!(parse_delete_target("all").unwrap(), DeleteTarget::All);
        assert_eq!(parse_delete_target("pending").unwrap(), DeleteTarget::Pending);
        assert_eq!(parse_delete_target("4").unwrap(), DeleteTarget::Index(4));
        assert_eq!(
            parse_delete_target("x").unwrap_err().to_string(),
            "Error: Integer number expected"
        );
    }

    #[test]
    fn test_backtrace_request() {
        assert_eq!(BacktraceRequest::parse("").unwrap(), BacktraceRequest::default());
        assert_eq!(
            BacktraceRequest::parse("5 t").unwrap(),
            BacktraceRequest {
                min_depth: 0,
                max_depth: 5,
                get_total: true
            }
        );
        assert_eq!(
            BacktraceRequest::parse("2 4").unwrap(),
            BacktraceRequest {
                min_depth: 2,
                max_depth: 4,
                get_total: false
            }
        );
        assert!(BacktraceRequest::parse("0").is_err());
        assert!(BacktraceRequest::parse("-1 3").is_err());
        assert_eq!(
            BacktraceRequest::parse("4 2").unwrap_err().to_string(),
            "Error: Start depth needs to be lower than or equal to max depth"
        );
        assert!(BacktraceRequest::parse("a").is_err());
    }
}
