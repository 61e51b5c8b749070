//! 구독 상태 및 키별 캐시 관리.
//!
//! (채널, 페어[, 타임프레임]) 키마다 구독 수명주기 상태와 해당 키의
//! 캐시(최근 체결, 캔들 집계기, 호가창)를 함께 관리합니다.
//!
//! # 상태 전이
//!
//! ```text
//! Unsubscribed ──[subscribe 호출]──> Initialising
//!      ↑                                 │
//!      │                    [키에 대한 첫 수신 이벤트]
//!      │                                 ↓
//!      └──[unsubscribe 호출]──── Subscribed
//! ```
//!
//! unsubscribe는 상태만 되돌리는 것이 아니라 해당 키의 캐시 항목을
//! 삭제합니다. 모든 필드는 하나의 락으로 보호됩니다. 임계 구역은 짧고
//! (O(log n)), 락을 잡은 채 사용자 콜백을 호출하지 않습니다.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cointrader_core::{Candle, Symbol, Timeframe, TradeTick};
use serde::{Deserialize, Serialize};

use crate::book::OrderBookCache;
use crate::candle::CandleAggregator;
use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::Channel;

/// 구독 수명주기 상태.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// 구독되지 않음
    #[default]
    Unsubscribed,
    /// 구독 요청됨, 첫 이벤트 대기 중
    Initialising,
    /// 첫 이벤트 수신으로 확정됨
    Subscribed,
}

/// 구독 키: (채널, 페어[, 타임프레임]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    /// 구독 채널
    pub channel: Channel,
    /// 거래 심볼
    pub symbol: Symbol,
    /// 타임프레임 (캔들 채널에만 사용)
    pub timeframe: Option<Timeframe>,
}

impl SubscriptionKey {
    /// 체결 채널 키를 생성합니다.
    pub fn trade(symbol: Symbol) -> Self {
        Self {
            channel: Channel::Trade,
            symbol,
            timeframe: None,
        }
    }

    /// 캔들 채널 키를 생성합니다.
    pub fn candle(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self {
            channel: Channel::Candle,
            symbol,
            timeframe: Some(timeframe),
        }
    }

    /// 호가창 채널 키를 생성합니다.
    pub fn order_book(symbol: Symbol) -> Self {
        Self {
            channel: Channel::OrderBook,
            symbol,
            timeframe: None,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    /// 키별 구독 상태
    status: HashMap<SubscriptionKey, SubscriptionStatus>,
    /// 페어별 최근 체결 틱
    trades: HashMap<Symbol, TradeTick>,
    /// (페어, 타임프레임)별 캔들 집계기
    candles: HashMap<(Symbol, Timeframe), CandleAggregator>,
    /// 페어별 호가창 캐시
    books: HashMap<Symbol, Arc<OrderBookCache>>,
}

/// 구독 상태와 키별 캐시의 레지스트리.
#[derive(Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 키의 현재 구독 상태를 반환합니다.
    pub fn status(&self, key: &SubscriptionKey) -> SubscriptionStatus {
        let state = self.state.read().unwrap();
        state.status.get(key).copied().unwrap_or_default()
    }

    /// 구독을 시작합니다.
    ///
    /// 키가 Unsubscribed일 때만 Initialising으로 전이하고 true를
    /// 반환합니다. 이미 진행 중이거나 확정된 구독은 no-op입니다.
    pub fn begin_subscribe(&self, key: SubscriptionKey) -> bool {
        let mut state = self.state.write().unwrap();
        match state.status.get(&key) {
            None | Some(SubscriptionStatus::Unsubscribed) => {
                state.status.insert(key, SubscriptionStatus::Initialising);
                true
            }
            _ => false,
        }
    }

    /// 구독을 해제하고 키의 캐시 항목을 삭제합니다.
    ///
    /// 구독된 적이 없는 키에 대해서도 안전합니다. 해제 전에 구독이
    /// 존재했는지 여부를 반환합니다.
    pub fn clear_key(&self, key: &SubscriptionKey) -> bool {
        let mut state = self.state.write().unwrap();
        let existed = state.status.remove(key).is_some();

        match key.channel {
            Channel::Trade => {
                state.trades.remove(&key.symbol);
            }
            Channel::Candle => {
                if let Some(tf) = key.timeframe {
                    state.candles.remove(&(key.symbol.clone(), tf));
                }
            }
            Channel::OrderBook => {
                state.books.remove(&key.symbol);
            }
        }

        existed
    }

    /// 체결 틱을 기록합니다.
    ///
    /// 체결 채널 키를 Subscribed로 전이하고 최근 체결을 덮어쓰며, 이
    /// 심볼의 캔들 구독에도 틱을 접어 넣습니다. 구독되지 않은 키의
    /// 이벤트는 false를 반환합니다 (버림).
    pub fn record_trade(&self, tick: TradeTick) -> bool {
        let mut state = self.state.write().unwrap();
        let key = SubscriptionKey::trade(tick.symbol.clone());

        match state.status.get_mut(&key) {
            None | Some(SubscriptionStatus::Unsubscribed) => return false,
            Some(status) => *status = SubscriptionStatus::Subscribed,
        }

        // 활성 캔들 구독에 틱 반영 (집계기는 첫 틱에서 생성)
        let candle_keys: Vec<(Symbol, Timeframe)> = state
            .status
            .keys()
            .filter(|k| k.channel == Channel::Candle && k.symbol == tick.symbol)
            .filter_map(|k| k.timeframe.map(|tf| (k.symbol.clone(), tf)))
            .collect();

        for cache_key in candle_keys {
            let aggregator = state.candles.entry(cache_key.clone()).or_insert_with(|| {
                CandleAggregator::new(cache_key.0.clone(), cache_key.1, tick.timestamp)
            });
            aggregator.apply_trade(tick.timestamp, tick.price, tick.quantity);
        }

        state.trades.insert(tick.symbol.clone(), tick);
        true
    }

    /// 거래소가 전달한 캔들을 기록합니다.
    ///
    /// 캔들 채널 키를 Subscribed로 전이하고 현재 버킷을 교체합니다.
    /// 구독되지 않은 키의 이벤트는 false를 반환합니다 (버림).
    pub fn record_candle(&self, candle: Candle) -> bool {
        let mut state = self.state.write().unwrap();
        let key = SubscriptionKey::candle(candle.symbol.clone(), candle.timeframe);

        match state.status.get_mut(&key) {
            None | Some(SubscriptionStatus::Unsubscribed) => return false,
            Some(status) => *status = SubscriptionStatus::Subscribed,
        }

        let cache_key = (candle.symbol.clone(), candle.timeframe);
        match state.candles.get_mut(&cache_key) {
            Some(aggregator) => aggregator.replace(candle),
            None => {
                state
                    .candles
                    .insert(cache_key, CandleAggregator::from_candle(candle));
            }
        }
        true
    }

    /// 초기화된 호가창 캐시를 설치합니다.
    ///
    /// 호가창 채널 키를 Subscribed로 전이합니다. 구독되지 않은 키의
    /// 이벤트는 false를 반환합니다 (버림).
    pub fn install_book(&self, cache: OrderBookCache) -> bool {
        let mut state = self.state.write().unwrap();
        let key = SubscriptionKey::order_book(cache.symbol().clone());

        match state.status.get_mut(&key) {
            None | Some(SubscriptionStatus::Unsubscribed) => return false,
            Some(status) => *status = SubscriptionStatus::Subscribed,
        }

        state.books.insert(cache.symbol().clone(), Arc::new(cache));
        true
    }

    /// 호가창 증분 업데이트를 적용할 캐시를 찾습니다.
    ///
    /// 구독되지 않은 키는 `Ok(None)` (버림), 초기화 전 업데이트는
    /// 어댑터 버그이므로 `ProtocolViolation` 에러입니다.
    pub fn book_for_update(&self, symbol: &Symbol) -> ExchangeResult<Option<Arc<OrderBookCache>>> {
        let mut state = self.state.write().unwrap();
        let key = SubscriptionKey::order_book(symbol.clone());

        match state.status.get(&key) {
            None | Some(SubscriptionStatus::Unsubscribed) => return Ok(None),
            Some(_) => {}
        }

        let cache = match state.books.get(symbol) {
            Some(cache) => Arc::clone(cache),
            None => {
                return Err(ExchangeError::ProtocolViolation(format!(
                    "order book update for {} before init",
                    symbol
                )))
            }
        };

        state.status.insert(key, SubscriptionStatus::Subscribed);
        Ok(Some(cache))
    }

    /// 페어의 최근 체결 틱을 반환합니다.
    pub fn last_trade(&self, symbol: &Symbol) -> Option<TradeTick> {
        let state = self.state.read().unwrap();
        state.trades.get(symbol).cloned()
    }

    /// (페어, 타임프레임)의 현재 캔들을 반환합니다.
    ///
    /// 조회 시점 기준으로 버킷을 지연 전진시킵니다.
    pub fn last_candle(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Candle> {
        let mut state = self.state.write().unwrap();
        state
            .candles
            .get_mut(&(symbol.clone(), timeframe))
            .map(|aggregator| aggregator.current(now))
    }

    /// 페어의 호가창 캐시를 반환합니다.
    pub fn book(&self, symbol: &Symbol) -> Option<Arc<OrderBookCache>> {
        let state = self.state.read().unwrap();
        state.books.get(symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn create_test_symbol() -> Symbol {
        Symbol::new("BTC", "USDT")
    }

    fn create_test_tick(price: rust_decimal::Decimal) -> TradeTick {
        TradeTick::new(create_test_symbol(), price, dec!(1), Utc::now())
    }

    #[test]
    fn test_status_transitions() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::trade(create_test_symbol());

        assert_eq!(registry.status(&key), SubscriptionStatus::Unsubscribed);

        assert!(registry.begin_subscribe(key.clone()));
        assert_eq!(registry.status(&key), SubscriptionStatus::Initialising);

        // 중복 구독은 no-op
        assert!(!registry.begin_subscribe(key.clone()));

        assert!(registry.record_trade(create_test_tick(dec!(100))));
        assert_eq!(registry.status(&key), SubscriptionStatus::Subscribed);

        assert!(registry.clear_key(&key));
        assert_eq!(registry.status(&key), SubscriptionStatus::Unsubscribed);
    }

    #[test]
    fn test_event_for_unsubscribed_key_dropped() {
        let registry = SubscriptionRegistry::new();

        assert!(!registry.record_trade(create_test_tick(dec!(100))));
        assert!(registry.last_trade(&create_test_symbol()).is_none());
    }

    #[test]
    fn test_clear_key_removes_cache() {
        let registry = SubscriptionRegistry::new();
        let symbol = create_test_symbol();
        let key = SubscriptionKey::trade(symbol.clone());

        registry.begin_subscribe(key.clone());
        registry.record_trade(create_test_tick(dec!(100)));
        assert!(registry.last_trade(&symbol).is_some());

        registry.clear_key(&key);
        assert!(registry.last_trade(&symbol).is_none());
    }

    #[test]
    fn test_unsubscribe_never_subscribed_is_safe() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::order_book(create_test_symbol());

        assert!(!registry.clear_key(&key));
    }

    #[test]
    fn test_trade_feeds_candle_aggregator() {
        let registry = SubscriptionRegistry::new();
        let symbol = create_test_symbol();

        registry.begin_subscribe(SubscriptionKey::trade(symbol.clone()));
        registry.begin_subscribe(SubscriptionKey::candle(symbol.clone(), Timeframe::M1));

        let now = Utc::now();
        registry.record_trade(TradeTick::new(symbol.clone(), dec!(100), dec!(2), now));

        let candle = registry.last_candle(&symbol, Timeframe::M1, now).unwrap();
        assert_eq!(candle.close, dec!(100));
        assert_eq!(candle.volume, dec!(2));
    }

    #[test]
    fn test_book_update_before_init_is_violation() {
        let registry = SubscriptionRegistry::new();
        let symbol = create_test_symbol();
        let key = SubscriptionKey::order_book(symbol.clone());

        // 구독 전 이벤트는 조용히 버림
        assert!(matches!(registry.book_for_update(&symbol), Ok(None)));

        // 구독 후 초기화 전 업데이트는 계약 위반
        registry.begin_subscribe(key);
        assert!(matches!(
            registry.book_for_update(&symbol),
            Err(ExchangeError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_install_book_and_update() {
        let registry = SubscriptionRegistry::new();
        let symbol = create_test_symbol();
        let key = SubscriptionKey::order_book(symbol.clone());

        registry.begin_subscribe(key.clone());
        assert!(registry.install_book(OrderBookCache::new(symbol.clone(), 5)));
        assert_eq!(registry.status(&key), SubscriptionStatus::Subscribed);

        let cache = registry.book_for_update(&symbol).unwrap().unwrap();
        cache.update(cointrader_core::OrderBookEntry::new(
            cointrader_core::BookSide::Ask,
            dec!(100),
            dec!(1),
        ));
        assert_eq!(registry.book(&symbol).unwrap().snapshot(0).asks.len(), 1);
    }
}
