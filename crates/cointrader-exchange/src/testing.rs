//! 테스트 및 예제용 어댑터 구현.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use cointrader_core::{Symbol, Timeframe};

use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::{Channel, ConnectionStatus, ExchangeAdapter};

/// 와이어 호출 횟수를 세는 no-op 어댑터.
///
/// 구독 수명주기 테스트에서 스트림이 어댑터를 정확히 몇 번 호출했는지
/// 검증하는 데 사용합니다.
pub struct CountingAdapter {
    name: String,
    status: RwLock<ConnectionStatus>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    fail_next_subscribe: AtomicBool,
}

impl CountingAdapter {
    /// 새 카운팅 어댑터를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RwLock::new(ConnectionStatus::Closed),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
            fail_next_subscribe: AtomicBool::new(false),
        }
    }

    /// 지금까지의 subscribe 호출 횟수.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// 지금까지의 unsubscribe 호출 횟수.
    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    /// 다음 subscribe 호출이 실패하도록 설정합니다.
    pub fn fail_next_subscribe(&self) {
        self.fail_next_subscribe.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExchangeAdapter for CountingAdapter {
    fn name(&self) -> &str {
        &self.name
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
        if self.fail_next_subscribe.swap(false, Ordering::SeqCst) {
            return Err(ExchangeError::Connection("subscribe refused".to_string()));
        }
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn unsubscribe(
        &self,
        _channel: Channel,
        _symbols: &[Symbol],
        _timeframe: Option<Timeframe>,
    ) -> ExchangeResult<()> {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
