//! 거래소 독립적인 실시간 시장 데이터 스트림.
//!
//! 어댑터가 디코딩해 전달하는 정규화된 이벤트(체결/캔들/호가창)를 받아
//! 구독 레지스트리와 캐시를 갱신하고, 등록된 리스너에게 타입별 알림을
//! 전파합니다. 조회 API(최근 체결, 현재 캔들, 호가창 스냅샷)와 제어
//! API(구독/해제, 연결 수명주기)를 제공합니다.
//!
//! 같은 구독 키 안에서는 어댑터가 전달한 순서대로 이벤트가 적용되며,
//! `on_order_book_update`가 반환된 뒤의 스냅샷은 그 업데이트를 반드시
//! 반영합니다. 조회는 네트워크 I/O를 기다리지 않습니다.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use cointrader_core::{Candle, MarketConfig, OrderBook, OrderBookEntry, Symbol, Timeframe, TradeTick};
use tracing::{debug, error, info};

use crate::book::OrderBookCache;
use crate::error::{ExchangeError, ExchangeResult};
use crate::registry::{SubscriptionKey, SubscriptionRegistry, SubscriptionStatus};
use crate::traits::{Channel, ConnectionStatus, ExchangeAdapter};

/// 체결 알림 리스너.
pub type TradeHandler = Arc<dyn Fn(&TradeTick) + Send + Sync>;

/// 캔들 알림 리스너.
pub type CandleHandler = Arc<dyn Fn(&Candle) + Send + Sync>;

/// 호가창 알림 리스너. 갱신 직후의 깊이 제한 스냅샷을 받습니다.
pub type OrderBookHandler = Arc<dyn Fn(&OrderBook) + Send + Sync>;

/// 거래소 독립적인 시장 데이터 스트림.
///
/// 어댑터는 생성자 주입으로 전달되며, 이 타입은 어댑터 인터페이스에만
/// 의존합니다. 네트워크 장애는 어댑터의 연결 상태로 노출되고 이 계층은
/// 재시도하지 않습니다.
pub struct MarketDataStream {
    /// 거래소 어댑터
    adapter: Arc<dyn ExchangeAdapter>,
    /// 구독 상태 및 캐시
    registry: SubscriptionRegistry,
    /// 호가창 스냅샷 기본 깊이
    book_depth: usize,
    /// 체결 리스너
    trade_handlers: RwLock<Vec<TradeHandler>>,
    /// 캔들 리스너
    candle_handlers: RwLock<Vec<CandleHandler>>,
    /// 호가창 리스너
    book_handlers: RwLock<Vec<OrderBookHandler>>,
}

impl MarketDataStream {
    /// 새 시장 데이터 스트림을 생성합니다.
    pub fn new(adapter: Arc<dyn ExchangeAdapter>, config: MarketConfig) -> Self {
        Self {
            adapter,
            registry: SubscriptionRegistry::new(),
            book_depth: config.order_book_depth,
            trade_handlers: RwLock::new(Vec::new()),
            candle_handlers: RwLock::new(Vec::new()),
            book_handlers: RwLock::new(Vec::new()),
        }
    }

    /// 어댑터 이름을 반환합니다.
    pub fn exchange_name(&self) -> &str {
        self.adapter.name()
    }

    // === 연결 수명주기 ===

    /// 거래소에 연결합니다.
    pub async fn connect(&self) -> ExchangeResult<()> {
        self.adapter.connect().await
    }

    /// 거래소 연결을 해제합니다.
    pub async fn disconnect(&self) -> ExchangeResult<()> {
        self.adapter.disconnect().await
    }

    /// 어댑터의 현재 연결 상태를 반환합니다.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.adapter.connection_status()
    }

    // === 구독 제어 ===

    /// 채널 구독을 요청합니다.
    ///
    /// 멱등합니다: 이미 진행 중이거나 확정된 키는 건너뛰고, 새로 요청할
    /// 키가 없으면 어댑터 호출 없이 반환합니다. 캔들 채널은 타임프레임이
    /// 필수입니다.
    pub async fn subscribe(
        &self,
        channel: Channel,
        symbols: &[Symbol],
        timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()> {
        if channel == Channel::Candle && timeframe.is_none() {
            return Err(ExchangeError::Subscription(
                "candle subscription requires a timeframe".to_string(),
            ));
        }

        let pending: Vec<Symbol> = symbols
            .iter()
            .filter(|symbol| {
                self.registry
                    .begin_subscribe(Self::key(channel, symbol, timeframe))
            })
            .cloned()
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.adapter.subscribe(channel, &pending, timeframe).await {
            // 와이어 구독 실패 시 로컬 상태 롤백
            for symbol in &pending {
                self.registry.clear_key(&Self::key(channel, symbol, timeframe));
            }
            return Err(err);
        }

        info!(%channel, pairs = pending.len(), "Subscribed");
        Ok(())
    }

    /// 채널 구독을 해제합니다.
    ///
    /// 구독된 적이 없는 키에 대해서도 안전합니다. 키의 캐시 항목은
    /// 오래된 것으로 표시되는 것이 아니라 즉시 삭제됩니다.
    pub async fn unsubscribe(
        &self,
        channel: Channel,
        symbols: &[Symbol],
        timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()> {
        let active: Vec<Symbol> = symbols
            .iter()
            .filter(|symbol| self.registry.clear_key(&Self::key(channel, symbol, timeframe)))
            .cloned()
            .collect();

        if active.is_empty() {
            return Ok(());
        }

        self.adapter.unsubscribe(channel, &active, timeframe).await?;

        info!(%channel, pairs = active.len(), "Unsubscribed");
        Ok(())
    }

    /// 키의 구독 상태를 반환합니다.
    pub fn get_subscription_status(
        &self,
        channel: Channel,
        symbol: &Symbol,
        timeframe: Option<Timeframe>,
    ) -> SubscriptionStatus {
        self.registry.status(&Self::key(channel, symbol, timeframe))
    }

    fn key(channel: Channel, symbol: &Symbol, timeframe: Option<Timeframe>) -> SubscriptionKey {
        SubscriptionKey {
            channel,
            symbol: symbol.clone(),
            timeframe: if channel == Channel::Candle {
                timeframe
            } else {
                None
            },
        }
    }

    // === 수신 이벤트 핸들러 (어댑터 수신 태스크에서 호출) ===

    /// 체결 틱 수신을 처리합니다.
    ///
    /// 체결 키를 Subscribed로 전이하고 최근 체결 캐시를 덮어쓴 뒤
    /// 리스너에게 알립니다. 구독 해제된 키의 이벤트는 버립니다.
    pub fn on_trade(&self, tick: TradeTick) {
        if !self.registry.record_trade(tick.clone()) {
            debug!(symbol = %tick.symbol, "Dropping trade for unsubscribed pair");
            return;
        }

        let handlers = self.trade_handlers.read().unwrap().clone();
        for handler in &handlers {
            handler(&tick);
        }
    }

    /// 거래소 캔들 수신을 처리합니다.
    pub fn on_candle(&self, candle: Candle) {
        if !self.registry.record_candle(candle.clone()) {
            debug!(symbol = %candle.symbol, timeframe = %candle.timeframe, "Dropping candle for unsubscribed pair");
            return;
        }

        let handlers = self.candle_handlers.read().unwrap().clone();
        for handler in &handlers {
            handler(&candle);
        }
    }

    /// 호가창 초기 스냅샷 수신을 처리합니다.
    ///
    /// 어댑터가 구성한 캐시를 설치합니다. 증분 업데이트는 반드시 이
    /// 호출 이후에만 유효합니다.
    pub fn on_order_book_init(&self, cache: OrderBookCache) {
        let symbol = cache.symbol().clone();
        let snapshot = cache.snapshot(self.book_depth);

        if !self.registry.install_book(cache) {
            debug!(symbol = %symbol, "Dropping order book init for unsubscribed pair");
            return;
        }

        let handlers = self.book_handlers.read().unwrap().clone();
        for handler in &handlers {
            handler(&snapshot);
        }
    }

    /// 호가창 증분 업데이트 수신을 처리합니다.
    ///
    /// 초기화되지 않은 페어의 업데이트는 어댑터 계약 위반으로 에러를
    /// 반환합니다. 구독 해제된 키의 이벤트는 조용히 버립니다.
    pub fn on_order_book_update(
        &self,
        symbol: &Symbol,
        entry: OrderBookEntry,
    ) -> ExchangeResult<()> {
        let cache = match self.registry.book_for_update(symbol) {
            Ok(Some(cache)) => cache,
            Ok(None) => {
                debug!(symbol = %symbol, "Dropping order book update for unsubscribed pair");
                return Ok(());
            }
            Err(err) => {
                error!(symbol = %symbol, %err, "Order book update rejected");
                return Err(err);
            }
        };

        cache.update(entry);
        let snapshot = cache.snapshot(self.book_depth);

        let handlers = self.book_handlers.read().unwrap().clone();
        for handler in &handlers {
            handler(&snapshot);
        }
        Ok(())
    }

    // === 조회 API ===

    /// 페어의 최근 체결 틱을 반환합니다.
    ///
    /// 구독 전이거나 데이터가 아직 없으면 0 값 틱을 반환합니다. 생존
    /// 여부는 `get_subscription_status`로 별도 조회합니다.
    pub fn get_last_trade(&self, symbol: &Symbol) -> TradeTick {
        self.registry
            .last_trade(symbol)
            .unwrap_or_else(|| TradeTick::zero(symbol.clone()))
    }

    /// (페어, 타임프레임)의 현재 캔들을 반환합니다.
    ///
    /// 버킷 경계는 조회 시점 기준으로 지연 전진합니다. 구독 전이면 0 값
    /// 캔들을 반환합니다.
    pub fn get_last_candle(&self, symbol: &Symbol, timeframe: Timeframe) -> Candle {
        self.registry
            .last_candle(symbol, timeframe, Utc::now())
            .unwrap_or_else(|| Candle::zero(symbol.clone(), timeframe))
    }

    /// 페어의 호가창 스냅샷을 반환합니다.
    ///
    /// `depth` 0은 저장된 모든 레벨을 의미합니다. 구독 전이면 빈
    /// 호가창을 반환합니다.
    pub fn get_order_book(&self, symbol: &Symbol, depth: usize) -> OrderBook {
        match self.registry.book(symbol) {
            Some(cache) => cache.snapshot(depth),
            None => OrderBook::empty(symbol.clone()),
        }
    }

    // === 리스너 등록 ===

    /// 체결 알림 리스너를 등록합니다.
    ///
    /// 콜백은 이벤트 전달 컨텍스트에서 동기적으로 호출되므로 블로킹하면
    /// 안 되며, 같은 스레드에서 이 스트림의 구독 제어 메서드로 재진입하면
    /// 안 됩니다.
    pub fn add_trade_handler(&self, handler: TradeHandler) {
        self.trade_handlers.write().unwrap().push(handler);
    }

    /// 캔들 알림 리스너를 등록합니다. 호출 규약은 `add_trade_handler`와
    /// 같습니다.
    pub fn add_candle_handler(&self, handler: CandleHandler) {
        self.candle_handlers.write().unwrap().push(handler);
    }

    /// 호가창 알림 리스너를 등록합니다. 호출 규약은 `add_trade_handler`와
    /// 같습니다.
    pub fn add_order_book_handler(&self, handler: OrderBookHandler) {
        self.book_handlers.write().unwrap().push(handler);
    }
}
