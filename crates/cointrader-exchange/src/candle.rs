//! 체결 틱으로부터의 증분 OHLCV 집계.
//!
//! 고정 간격 버킷 하나를 유지하면서 체결 틱을 접어 넣습니다. 버킷 경계는
//! 쓰기 시점이 아니라 조회 시점에 지연 전진하므로, 조회가 만료된 버킷을
//! 보고하는 일은 없습니다.

use chrono::{DateTime, Duration, Utc};
use cointrader_core::{Candle, Price, Quantity, Symbol, Timeframe};
use rust_decimal::Decimal;

/// 한 (심볼, 타임프레임)의 현재 캔들 버킷.
///
/// 버킷 시작 시간은 최초 시작 시간으로부터 간격의 정수 배로만 앞으로
/// 전진합니다.
#[derive(Debug, Clone)]
pub struct CandleAggregator {
    symbol: Symbol,
    timeframe: Timeframe,
    bucket_start: DateTime<Utc>,
    open: Price,
    high: Price,
    low: Price,
    close: Price,
    volume: Quantity,
    last_trade_at: DateTime<Utc>,
}

impl CandleAggregator {
    /// 지정 시작 시간의 빈 버킷으로 집계기를 생성합니다.
    pub fn new(symbol: Symbol, timeframe: Timeframe, bucket_start: DateTime<Utc>) -> Self {
        Self {
            symbol,
            timeframe,
            bucket_start,
            open: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
            close: Decimal::ZERO,
            volume: Decimal::ZERO,
            last_trade_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// 거래소가 전달한 캔들로 집계기를 생성합니다.
    pub fn from_candle(candle: Candle) -> Self {
        Self {
            symbol: candle.symbol,
            timeframe: candle.timeframe,
            bucket_start: candle.open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            last_trade_at: candle.open_time,
        }
    }

    /// 현재 버킷을 거래소가 전달한 캔들로 교체합니다.
    ///
    /// 거래소 캔들이 체결 틱 누적보다 우선합니다.
    pub fn replace(&mut self, candle: Candle) {
        self.bucket_start = candle.open_time;
        self.open = candle.open;
        self.high = candle.high;
        self.low = candle.low;
        self.close = candle.close;
        self.volume = candle.volume;
        if candle.open_time > self.last_trade_at {
            self.last_trade_at = candle.open_time;
        }
    }

    /// 체결 틱을 현재 버킷에 접어 넣습니다.
    ///
    /// 버킷 시작 이전의 지연 틱은 무시합니다. 버킷 전진은 여기서 하지
    /// 않고 조회 시점에 합니다.
    pub fn apply_trade(&mut self, time: DateTime<Utc>, price: Price, quantity: Quantity) {
        if time < self.bucket_start {
            return;
        }

        if self.volume.is_zero() && self.close.is_zero() {
            // 한 번도 체결을 받지 못한 버킷은 첫 틱으로 시드
            self.open = price;
            self.high = price;
            self.low = price;
            self.close = price;
        } else {
            if price > self.high {
                self.high = price;
            }
            if price < self.low {
                self.low = price;
            }
        }

        self.volume += quantity;

        if time == self.bucket_start {
            self.open = price;
        }
        if time > self.last_trade_at {
            self.close = price;
            self.last_trade_at = time;
        }
    }

    /// 현재 버킷을 반환합니다.
    ///
    /// `now`가 버킷 경계를 지났으면 먼저 버킷을 올바른 경계까지 전진시킨
    /// 뒤 보고합니다 (시가/고가/저가는 직전 종가, 거래량 0).
    pub fn current(&mut self, now: DateTime<Utc>) -> Candle {
        let interval = self.timeframe.as_secs() as i64;
        let elapsed = (now - self.bucket_start).num_seconds();

        if elapsed >= interval && interval > 0 {
            let periods = elapsed / interval;
            self.bucket_start = self.bucket_start + Duration::seconds(periods * interval);
            self.open = self.close;
            self.high = self.close;
            self.low = self.close;
            self.volume = Decimal::ZERO;
        }

        Candle {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            open_time: self.bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }

    /// 현재 버킷 시작 시간을 반환합니다.
    pub fn bucket_start(&self) -> DateTime<Utc> {
        self.bucket_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn create_test_aggregator() -> CandleAggregator {
        CandleAggregator::new(Symbol::new("BTC", "USDT"), Timeframe::M1, base_time())
    }

    #[test]
    fn test_apply_trade_folds_into_bucket() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t, dec!(100), dec!(1));
        agg.apply_trade(t + Duration::seconds(10), dec!(110), dec!(2));
        agg.apply_trade(t + Duration::seconds(20), dec!(95), dec!(1));

        let candle = agg.current(t + Duration::seconds(30));
        assert_eq!(candle.open, dec!(100));
        assert_eq!(candle.high, dec!(110));
        assert_eq!(candle.low, dec!(95));
        assert_eq!(candle.close, dec!(95));
        assert_eq!(candle.volume, dec!(4));
    }

    #[test]
    fn test_late_tick_ignored() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t + Duration::seconds(5), dec!(100), dec!(1));
        agg.apply_trade(t - Duration::seconds(5), dec!(50), dec!(9));

        let candle = agg.current(t + Duration::seconds(10));
        assert_eq!(candle.low, dec!(100));
        assert_eq!(candle.volume, dec!(1));
    }

    #[test]
    fn test_out_of_order_tick_keeps_close() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t + Duration::seconds(30), dec!(105), dec!(1));
        // 버킷 내 역순 틱: 고가/저가에는 반영되지만 종가는 유지
        agg.apply_trade(t + Duration::seconds(10), dec!(120), dec!(1));

        let candle = agg.current(t + Duration::seconds(40));
        assert_eq!(candle.high, dec!(120));
        assert_eq!(candle.close, dec!(105));
    }

    #[test]
    fn test_roll_forward_on_read() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t, dec!(100), dec!(1));
        agg.apply_trade(t + Duration::seconds(30), dec!(108), dec!(1));

        // 다음 버킷으로 전진: 시가=고가=저가=직전 종가, 거래량 0
        let candle = agg.current(t + Duration::seconds(60));
        assert_eq!(candle.open_time, t + Duration::seconds(60));
        assert_eq!(candle.open, dec!(108));
        assert_eq!(candle.high, dec!(108));
        assert_eq!(candle.low, dec!(108));
        assert_eq!(candle.volume, dec!(0));
    }

    #[test]
    fn test_roll_skips_to_correct_boundary() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t, dec!(100), dec!(1));

        // 여러 간격을 건너뛰어도 경계는 간격의 정수 배
        let now = t + Duration::seconds(60 * 7 + 13);
        let candle = agg.current(now);
        assert_eq!(candle.open_time, t + Duration::seconds(60 * 7));

        let start = candle.open_time;
        assert!(start <= now && now < start + Duration::seconds(60));
    }

    #[test]
    fn test_bucket_start_only_advances() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t, dec!(100), dec!(1));
        agg.current(t + Duration::seconds(120));
        let advanced = agg.bucket_start();

        // 과거 시간 조회는 버킷을 되돌리지 않음
        agg.current(t);
        assert_eq!(agg.bucket_start(), advanced);
    }

    #[test]
    fn test_replace_with_exchange_candle() {
        let mut agg = create_test_aggregator();
        let t = base_time();

        agg.apply_trade(t, dec!(100), dec!(1));

        let candle = Candle {
            symbol: Symbol::new("BTC", "USDT"),
            timeframe: Timeframe::M1,
            open_time: t + Duration::seconds(60),
            open: dec!(101),
            high: dec!(103),
            low: dec!(99),
            close: dec!(102),
            volume: dec!(42),
        };
        agg.replace(candle.clone());

        let current = agg.current(t + Duration::seconds(90));
        assert_eq!(current, candle);
    }
}
