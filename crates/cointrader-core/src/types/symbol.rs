//! 거래 심볼 정의.
//!
//! 이 모듈은 거래 가능한 암호화폐 페어를 나타내는 심볼 타입을 정의합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 거래 가능한 암호화폐 페어를 나타내는 트레이딩 심볼.
///
/// 심볼은 기준 자산과 호가 자산으로 구성됩니다. 예: BTC/USDT, ETH/GBP.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    /// 기준 자산 (예: BTC, ETH)
    pub base: String,
    /// 호가 자산 (예: USDT, GBP)
    pub quote: String,
}

impl Symbol {
    /// 새 심볼을 생성합니다.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// "BASE/QUOTE" 형식 문자열에서 심볼을 파싱합니다.
    pub fn from_string(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }

    /// 표준 심볼 문자열 형식을 반환합니다.
    pub fn to_standard_string(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_creation() {
        let symbol = Symbol::new("btc", "usdt");
        assert_eq!(symbol.base, "BTC");
        assert_eq!(symbol.quote, "USDT");
    }

    #[test]
    fn test_symbol_display() {
        let symbol = Symbol::new("BTC", "GBP");
        assert_eq!(symbol.to_string(), "BTC/GBP");
    }

    #[test]
    fn test_symbol_from_string() {
        let symbol = Symbol::from_string("ETH/USDT").unwrap();
        assert_eq!(symbol.base, "ETH");
        assert_eq!(symbol.quote, "USDT");

        assert!(Symbol::from_string("ETHUSDT").is_none());
        assert!(Symbol::from_string("/USDT").is_none());
    }
}
