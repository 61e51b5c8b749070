//! 거래소 어댑터 trait 정의.
//!
//! 이 모듈은 코어가 의존하는 거래소 경계 인터페이스를 정의합니다. 코어는
//! 구체적인 거래소 타입이 아니라 이 trait에만 의존하며, 거래소별 구현체는
//! 와이어 메시지를 정규화된 도메인 이벤트로 디코딩한 뒤에만
//! `MarketDataStream`의 `on_*` 핸들러를 호출해야 합니다.

use async_trait::async_trait;
use cointrader_core::{Symbol, Timeframe};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;

/// 시장 데이터 구독 채널.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// 체결 틱
    Trade,
    /// OHLCV 캔들
    Candle,
    /// 호가창
    OrderBook,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Trade => write!(f, "trade"),
            Channel::Candle => write!(f, "candle"),
            Channel::OrderBook => write!(f, "order_book"),
        }
    }
}

/// 거래소 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// 연결 끊김
    Closed,
    /// 연결 시도 중
    Connecting,
    /// 연결됨
    Open,
    /// 연결 해제 중
    Closing,
}

/// 통합 거래소 어댑터 인터페이스.
///
/// 연결 및 와이어 수준 (구독 해제를 포함한) 구독만 담당합니다. 수신한
/// 이벤트의 디코딩 결과는 어댑터가 소유한 수신 태스크에서
/// `MarketDataStream`의 `on_*` 핸들러로 전달합니다.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// 거래소 이름 반환.
    fn name(&self) -> &str;

    /// 현재 연결 상태 반환.
    fn connection_status(&self) -> ConnectionStatus;

    /// 거래소에 연결.
    async fn connect(&self) -> ExchangeResult<()>;

    /// 거래소 연결 해제.
    async fn disconnect(&self) -> ExchangeResult<()>;

    /// 와이어 수준 구독을 요청.
    ///
    /// `timeframe`은 캔들 채널에만 의미가 있습니다.
    async fn subscribe(
        &self,
        channel: Channel,
        symbols: &[Symbol],
        timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()>;

    /// 와이어 수준 구독 해제를 요청.
    async fn unsubscribe(
        &self,
        channel: Channel,
        symbols: &[Symbol],
        timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_display() {
        assert_eq!(Channel::Trade.to_string(), "trade");
        assert_eq!(Channel::OrderBook.to_string(), "order_book");
    }
}
