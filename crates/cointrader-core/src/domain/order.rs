//! 주문 타입 및 관리.
//!
//! 이 모듈은 트레이딩 시스템의 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderType` - 주문 유형 (시장가, 지정가 등)
//! - `OrderRequest` - 주문 요청
//! - `OpenOrder` - 미체결 주문
//! - `ClosedOrder` - 체결 완료 주문 기록

use crate::types::{Percentage, Price, Quantity, Symbol};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// 시장가 주문 - 현재 시장 가격으로 즉시 체결
    Market,
    /// 지정가 주문 - 지정 가격 이상/이하에서 체결
    Limit,
    /// 손절 주문 - 스톱 가격 도달 시 체결
    StopLoss,
    /// 트레일링 스톱 주문 - 극값 대비 반전 폭 도달 시 체결
    TrailingStopLoss,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::StopLoss => write!(f, "STOP_LOSS"),
            OrderType::TrailingStopLoss => write!(f, "TRAILING_STOP_LOSS"),
        }
    }
}

/// 새 주문 생성을 위한 주문 요청.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderType,
    /// 거래 수량
    pub quantity: Quantity,
    /// 지정가 (지정가 주문에 필수)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    /// 스톱 가격 (손절 주문에 필수)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    /// 트레일링 반전 비율 (트레일링 스톱 주문에 필수, 0.1 = 10%)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_delta: Option<Percentage>,
}

impl OrderRequest {
    /// 시장가 매수 주문을 생성합니다.
    pub fn market_buy(symbol: Symbol, quantity: Quantity) -> Self {
        Self {
            symbol,
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            trailing_delta: None,
        }
    }

    /// 시장가 매도 주문을 생성합니다.
    pub fn market_sell(symbol: Symbol, quantity: Quantity) -> Self {
        Self {
            side: Side::Sell,
            ..Self::market_buy(symbol, quantity)
        }
    }

    /// 지정가 매수 주문을 생성합니다.
    pub fn limit_buy(symbol: Symbol, quantity: Quantity, price: Price) -> Self {
        Self {
            symbol,
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            trailing_delta: None,
        }
    }

    /// 지정가 매도 주문을 생성합니다.
    pub fn limit_sell(symbol: Symbol, quantity: Quantity, price: Price) -> Self {
        Self {
            side: Side::Sell,
            ..Self::limit_buy(symbol, quantity, price)
        }
    }

    /// 손절 매수 주문을 생성합니다.
    pub fn stop_loss_buy(symbol: Symbol, quantity: Quantity, stop_price: Price) -> Self {
        Self {
            symbol,
            side: Side::Buy,
            order_type: OrderType::StopLoss,
            quantity,
            price: None,
            stop_price: Some(stop_price),
            trailing_delta: None,
        }
    }

    /// 손절 매도 주문을 생성합니다.
    pub fn stop_loss_sell(symbol: Symbol, quantity: Quantity, stop_price: Price) -> Self {
        Self {
            side: Side::Sell,
            ..Self::stop_loss_buy(symbol, quantity, stop_price)
        }
    }

    /// 트레일링 스톱 매수 주문을 생성합니다.
    pub fn trailing_stop_buy(symbol: Symbol, quantity: Quantity, delta: Percentage) -> Self {
        Self {
            symbol,
            side: Side::Buy,
            order_type: OrderType::TrailingStopLoss,
            quantity,
            price: None,
            stop_price: None,
            trailing_delta: Some(delta),
        }
    }

    /// 트레일링 스톱 매도 주문을 생성합니다.
    pub fn trailing_stop_sell(symbol: Symbol, quantity: Quantity, delta: Percentage) -> Self {
        Self {
            side: Side::Sell,
            ..Self::trailing_stop_buy(symbol, quantity, delta)
        }
    }
}

/// 체결 대기 중인 미체결 주문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    /// 주문 ID
    pub id: String,
    /// 거래 심볼
    pub symbol: Symbol,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderType,
    /// 거래 수량
    pub quantity: Quantity,
    /// 지정가
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    /// 스톱 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Price>,
    /// 트레일링 반전 비율
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailing_delta: Option<Percentage>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl OpenOrder {
    /// 요청으로부터 새 미체결 주문을 생성합니다.
    pub fn from_request(id: impl Into<String>, request: OrderRequest) -> Self {
        Self {
            id: id.into(),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            trailing_delta: request.trailing_delta,
            created_at: Utc::now(),
        }
    }
}

/// 체결 완료된 주문의 불변 기록.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedOrder {
    /// 주문 ID
    pub id: String,
    /// 거래 심볼
    pub symbol: Symbol,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub order_type: OrderType,
    /// 체결 수량
    pub quantity: Quantity,
    /// 체결 가격
    pub fill_price: Price,
    /// 체결 시각
    pub filled_at: DateTime<Utc>,
}
