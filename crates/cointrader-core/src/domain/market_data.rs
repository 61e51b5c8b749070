//! 시장 데이터 타입 및 구조체.
//!
//! 이 모듈은 시장 데이터 관련 타입을 정의합니다:
//! - `TradeTick` - 체결 틱 데이터
//! - `Candle` - OHLCV 캔들 데이터
//! - `OrderBookEntry` - 호가창 증분 업데이트 이벤트
//! - `OrderBook` - 호가창 스냅샷

use crate::types::{Price, Quantity, Symbol, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 체결 틱 데이터.
///
/// 페어별로 가장 최근에 관측된 체결 하나를 나타냅니다. 새 틱이 도착하면
/// 이전 값을 덮어쓰며, 이력 보관은 이 타입의 책임이 아닙니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 체결 가격
    pub price: Price,
    /// 체결 수량
    pub quantity: Quantity,
    /// 체결 시각
    pub timestamp: DateTime<Utc>,
}

impl TradeTick {
    /// 새 체결 틱을 생성합니다.
    pub fn new(
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            price,
            quantity,
            timestamp,
        }
    }

    /// 구독 전 조회에 대한 0 값 틱을 반환합니다.
    pub fn zero(symbol: Symbol) -> Self {
        Self {
            symbol,
            price: Decimal::ZERO,
            quantity: Decimal::ZERO,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// 데이터가 한 번도 수신되지 않은 0 값인지 확인합니다.
    pub fn is_zero(&self) -> bool {
        self.price.is_zero() && self.quantity.is_zero()
    }
}

/// OHLCV 캔들 데이터.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 버킷 시작 시간
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량 (기준 자산 단위)
    pub volume: Quantity,
}

impl Candle {
    /// 구독 전 조회에 대한 0 값 캔들을 반환합니다.
    pub fn zero(symbol: Symbol, timeframe: Timeframe) -> Self {
        Self {
            symbol,
            timeframe,
            open_time: DateTime::<Utc>::UNIX_EPOCH,
            open: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
            close: Decimal::ZERO,
            volume: Decimal::ZERO,
        }
    }

    /// 캔들 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// 호가창 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// 매도 호가
    Ask,
    /// 매수 호가
    Bid,
}

impl std::fmt::Display for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookSide::Ask => write!(f, "ask"),
            BookSide::Bid => write!(f, "bid"),
        }
    }
}

/// 호가창 증분 업데이트 이벤트.
///
/// 수량 0은 해당 가격 레벨의 삭제를 의미합니다. 수량 0인 레벨은
/// 저장되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookEntry {
    /// 호가 방향
    pub side: BookSide,
    /// 가격
    pub price: Price,
    /// 수량
    pub quantity: Quantity,
}

impl OrderBookEntry {
    /// 새 호가창 항목을 생성합니다.
    pub fn new(side: BookSide, price: Price, quantity: Quantity) -> Self {
        Self {
            side,
            price,
            quantity,
        }
    }
}

/// 호가창 가격 레벨.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    /// 가격
    pub price: Price,
    /// 수량
    pub quantity: Quantity,
}

/// 호가창 스냅샷.
///
/// 캐시로부터 깊이 제한을 적용해 복사된 불변 스냅샷입니다. 소비자는
/// 캐시 자체를 참조하지 않으므로 캐시 수명과 무관하게 사용할 수 있습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 매수 호가 - 가격 내림차순 정렬
    pub bids: Vec<OrderBookLevel>,
    /// 매도 호가 - 가격 오름차순 정렬
    pub asks: Vec<OrderBookLevel>,
    /// 스냅샷 생성 시각
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// 구독 전 조회에 대한 빈 호가창을 반환합니다.
    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: Vec::new(),
            asks: Vec::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// 최우선 매수 호가를 반환합니다.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    /// 최우선 매도 호가를 반환합니다.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// 스프레드를 반환합니다.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// 중간 가격을 반환합니다.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_tick_zero() {
        let tick = TradeTick::zero(Symbol::new("BTC", "USDT"));
        assert!(tick.is_zero());
        assert_eq!(tick.price, Decimal::ZERO);
    }

    #[test]
    fn test_candle_helpers() {
        let mut candle = Candle::zero(Symbol::new("BTC", "USDT"), Timeframe::M1);
        candle.open = dec!(100);
        candle.high = dec!(110);
        candle.low = dec!(95);
        candle.close = dec!(105);

        assert!(candle.is_bullish());
        assert_eq!(candle.range(), dec!(15));
    }

    #[test]
    fn test_order_book_helpers() {
        let ob = OrderBook {
            symbol: Symbol::new("ETH", "USDT"),
            bids: vec![
                OrderBookLevel { price: dec!(2000), quantity: dec!(10) },
                OrderBookLevel { price: dec!(1999), quantity: dec!(20) },
            ],
            asks: vec![
                OrderBookLevel { price: dec!(2001), quantity: dec!(15) },
                OrderBookLevel { price: dec!(2002), quantity: dec!(25) },
            ],
            timestamp: Utc::now(),
        };

        assert_eq!(ob.best_bid(), Some(dec!(2000)));
        assert_eq!(ob.best_ask(), Some(dec!(2001)));
        assert_eq!(ob.spread(), Some(dec!(1)));
        assert_eq!(ob.mid_price(), Some(dec!(2000.5)));
    }

    #[test]
    fn test_empty_order_book() {
        let ob = OrderBook::empty(Symbol::new("BTC", "USDT"));
        assert!(ob.bids.is_empty());
        assert_eq!(ob.best_bid(), None);
        assert_eq!(ob.spread(), None);
    }
}
