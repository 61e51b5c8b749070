//! 모의투자 및 백테스팅을 위한 주문 실행 시뮬레이션.
//!
//! 이 모듈은 다음 기능을 제공합니다:
//! - 실시간 체결 스트림에 대한 주문 체결 시뮬레이션
//! - 자산 잔고 및 주문 이력 추적
//! - 과거 틱 재생을 통한 백테스팅
//!
//! # 예제
//!
//! ```ignore
//! use cointrader_exchange::paper::{PaperExchange, ReplayAdapter};
//!
//! let stream = Arc::new(MarketDataStream::new(
//!     Arc::new(ReplayAdapter::new()),
//!     MarketConfig::default(),
//! ));
//! let exchange = PaperExchange::new(config, stream.clone());
//!
//! let id = exchange
//!     .add_order(OrderRequest::limit_buy(symbol, dec!(1), dec!(10)))
//!     .await?;
//! ```

mod exchange;
mod feed;

pub use exchange::PaperExchange;
pub use feed::{generate_sample_ticks, ReplayAdapter, ReplayFeed};
