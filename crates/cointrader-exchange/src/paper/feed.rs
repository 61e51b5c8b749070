//! 백테스팅을 위한 체결 틱 재생 피드.
//!
//! 기록된 체결 틱을 시간 순서대로 `MarketDataStream`에 밀어 넣어, 모의
//! 거래소가 라이브 스트림과 동일한 경로로 과거 데이터를 소비하게 합니다.

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cointrader_core::{Price, Symbol, Timeframe, TradeTick};
use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::{ExchangeError, ExchangeResult};
use crate::stream::MarketDataStream;
use crate::traits::{Channel, ConnectionStatus, ExchangeAdapter};

/// 재생 전용 no-op 어댑터.
///
/// 백테스팅에는 와이어 연결이 없으므로 구독 요청은 항상 성공하고 연결
/// 상태만 추적합니다.
pub struct ReplayAdapter {
    status: RwLock<ConnectionStatus>,
}

impl ReplayAdapter {
    /// 새 재생 어댑터를 생성합니다.
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ConnectionStatus::Closed),
        }
    }
}

impl Default for ReplayAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeAdapter for ReplayAdapter {
    fn name(&self) -> &str {
        "replay"
    }

    fn connection_status(&self) -> ConnectionStatus {
        *self.status.read().unwrap()
    }

    async fn connect(&self) -> ExchangeResult<()> {
        *self.status.write().unwrap() = ConnectionStatus::Open;
        Ok(())
    }

    async fn disconnect(&self) -> ExchangeResult<()> {
        *self.status.write().unwrap() = ConnectionStatus::Closed;
        Ok(())
    }

    async fn subscribe(
        &self,
        _channel: Channel,
        _symbols: &[Symbol],
        _timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()> {
        Ok(())
    }

    async fn unsubscribe(
        &self,
        _channel: Channel,
        _symbols: &[Symbol],
        _timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()> {
        Ok(())
    }
}

/// 과거 체결 틱의 재생 피드.
pub struct ReplayFeed {
    /// 시간 오름차순으로 정렬된 틱
    ticks: Vec<TradeTick>,
}

impl ReplayFeed {
    /// 빈 피드를 생성합니다.
    pub fn new() -> Self {
        Self { ticks: Vec::new() }
    }

    /// 틱 목록으로 피드를 생성합니다. 시간 순서로 정렬됩니다.
    pub fn from_ticks(mut ticks: Vec<TradeTick>) -> Self {
        ticks.sort_by_key(|tick| tick.timestamp);
        Self { ticks }
    }

    /// CSV 파일에서 틱을 로드합니다.
    ///
    /// 예상 형식: `timestamp_ms,price,quantity` (헤더 행 허용).
    pub fn load_from_csv(
        &mut self,
        symbol: Symbol,
        path: impl AsRef<Path>,
    ) -> ExchangeResult<usize> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ExchangeError::Parse(format!("failed to read CSV file: {}", e)))?;

        let mut ticks = Self::parse_csv(symbol, &content)?;
        let count = ticks.len();
        self.ticks.append(&mut ticks);
        self.ticks.sort_by_key(|tick| tick.timestamp);
        Ok(count)
    }

    /// CSV 본문을 틱 목록으로 파싱합니다.
    fn parse_csv(symbol: Symbol, content: &str) -> ExchangeResult<Vec<TradeTick>> {
        let mut ticks = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            if line.is_empty() || (line_no == 0 && line.contains("timestamp")) {
                continue;
            }

            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() < 3 {
                return Err(ExchangeError::Parse(format!(
                    "line {}: expected timestamp_ms,price,quantity",
                    line_no + 1
                )));
            }

            let timestamp = parts[0]
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis)
                .ok_or_else(|| {
                    ExchangeError::Parse(format!("line {}: invalid timestamp", line_no + 1))
                })?;

            let price: Decimal = parts[1].trim().parse().map_err(|_| {
                ExchangeError::Parse(format!("line {}: invalid price", line_no + 1))
            })?;
            let quantity: Decimal = parts[2].trim().parse().map_err(|_| {
                ExchangeError::Parse(format!("line {}: invalid quantity", line_no + 1))
            })?;

            ticks.push(TradeTick::new(symbol.clone(), price, quantity, timestamp));
        }

        Ok(ticks)
    }

    /// 로드된 틱 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    /// 피드가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// 모든 틱을 시간 순서대로 스트림에 전달합니다.
    ///
    /// 전달한 틱 수를 반환합니다. 구독되지 않은 페어의 틱은 스트림이
    /// 버립니다.
    pub fn run(&self, stream: &MarketDataStream) -> usize {
        for tick in &self.ticks {
            stream.on_trade(tick.clone());
        }

        info!(ticks = self.ticks.len(), "Replay finished");
        self.ticks.len()
    }
}

impl Default for ReplayFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// 랜덤 워크 샘플 틱을 생성합니다.
///
/// 백테스팅 데모와 테스트에서 사용합니다. `volatility`는 틱 간 최대
/// 가격 변동률입니다 (예: 0.01 = ±1%).
pub fn generate_sample_ticks(
    symbol: Symbol,
    count: usize,
    start_price: Price,
    volatility: f64,
) -> Vec<TradeTick> {
    let mut rng = rand::thread_rng();
    let mut price = start_price;
    let start_time = Utc::now() - Duration::seconds(count as i64);
    let mut ticks = Vec::with_capacity(count);

    for i in 0..count {
        let step = rng.gen_range(-volatility..volatility);
        let factor = Decimal::from_f64_retain(1.0 + step).unwrap_or(Decimal::ONE);
        price = (price * factor).round_dp(8);
        if price <= Decimal::ZERO {
            price = start_price;
        }

        let quantity = Decimal::from_f64_retain(rng.gen_range(0.01..1.0))
            .unwrap_or(Decimal::ONE)
            .round_dp(4);

        ticks.push(TradeTick::new(
            symbol.clone(),
            price,
            quantity,
            start_time + Duration::seconds(i as i64),
        ));
    }

    ticks
}
