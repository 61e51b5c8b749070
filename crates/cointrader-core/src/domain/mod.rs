//! 핵심 도메인 모델.

mod market_data;
mod order;

pub use market_data::{BookSide, Candle, OrderBook, OrderBookEntry, OrderBookLevel, TradeTick};
pub use order::{ClosedOrder, OpenOrder, OrderRequest, OrderType, Side};
