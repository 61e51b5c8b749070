//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다. 설정은 TOML 파일에서
//! 로드되며 `COINTRADER__` 접두사의 환경 변수로 오버라이드할 수 있습니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 시장 데이터 설정
    #[serde(default)]
    pub market: MarketConfig,
    /// 모의투자 설정
    #[serde(default)]
    pub paper: PaperTradingConfig,
    /// 거래소 설정
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 시장 데이터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// 호가창 깊이 (0 = 무제한)
    #[serde(default = "default_order_book_depth")]
    pub order_book_depth: usize,
    /// 기본 수집 타임프레임
    #[serde(default = "default_timeframes")]
    pub default_timeframes: Vec<String>,
}

fn default_order_book_depth() -> usize {
    20
}

fn default_timeframes() -> Vec<String> {
    vec!["1m".to_string(), "1h".to_string()]
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            order_book_depth: default_order_book_depth(),
            default_timeframes: default_timeframes(),
        }
    }
}

/// 모의투자 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaperTradingConfig {
    /// 자산별 초기 잔고
    #[serde(default)]
    pub initial_balances: HashMap<String, Decimal>,
    /// 거래 수수료율 (예: 0.1%의 경우 0.001)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

impl Default for PaperTradingConfig {
    fn default() -> Self {
        let mut initial_balances = HashMap::new();
        initial_balances.insert("USDT".to_string(), Decimal::new(10000, 0));

        Self {
            initial_balances,
            fee_rate: default_fee_rate(),
        }
    }
}

impl PaperTradingConfig {
    /// 초기 잔고 없이 설정을 생성합니다.
    pub fn empty() -> Self {
        Self {
            initial_balances: HashMap::new(),
            fee_rate: default_fee_rate(),
        }
    }

    /// 자산의 초기 잔고를 추가합니다.
    pub fn with_initial_balance(mut self, asset: &str, amount: Decimal) -> Self {
        self.initial_balances.insert(asset.to_string(), amount);
        self
    }

    /// 수수료율을 설정합니다.
    pub fn with_fee_rate(mut self, rate: Decimal) -> Self {
        self.fee_rate = rate;
        self
    }
}

/// 거래소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    /// 이 거래소 활성화 여부
    pub enabled: bool,
    /// 거래소 이름
    pub name: String,
    /// 연결 타임아웃 (초)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

fn default_connection_timeout() -> u64 {
    10
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("COINTRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.market.order_book_depth, 20);
        assert_eq!(config.paper.fee_rate, dec!(0.001));
        assert_eq!(
            config.paper.initial_balances.get("USDT"),
            Some(&dec!(10000))
        );
    }

    #[test]
    fn test_paper_config_builder() {
        let config = PaperTradingConfig::empty()
            .with_initial_balance("GBP", dec!(100))
            .with_fee_rate(dec!(0.002));

        assert_eq!(config.initial_balances.get("GBP"), Some(&dec!(100)));
        assert!(config.initial_balances.get("USDT").is_none());
        assert_eq!(config.fee_rate, dec!(0.002));
    }
}
