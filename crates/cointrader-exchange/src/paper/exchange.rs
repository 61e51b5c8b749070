//! 모의투자를 위한 주문 실행 시뮬레이터.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use cointrader_core::{
    ClosedOrder, OpenOrder, OrderRequest, OrderType, PaperTradingConfig, Price, Side, TradeTick,
};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{ExchangeError, ExchangeResult};
use crate::registry::SubscriptionStatus;
use crate::stream::MarketDataStream;
use crate::traits::Channel;

/// 시뮬레이터 내부 상태.
///
/// 모든 필드가 하나의 락으로 보호됩니다. 주문 ID 카운터도 이 락 안에서만
/// 증가합니다.
struct PaperState {
    /// 자산별 잔고
    balances: HashMap<String, Decimal>,
    /// ID별 미체결 주문
    open_orders: HashMap<String, OpenOrder>,
    /// 체결 완료 주문 이력
    closed_orders: Vec<ClosedOrder>,
    /// 트레일링 주문별 진행 극값 (매수는 최저가, 매도는 최고가)
    trailing_marks: HashMap<String, Price>,
    /// 다음 주문 ID
    next_order_id: u64,
}

impl PaperState {
    fn new(initial_balances: &HashMap<String, Decimal>) -> Self {
        Self {
            balances: initial_balances.clone(),
            open_orders: HashMap::new(),
            closed_orders: Vec::new(),
            trailing_marks: HashMap::new(),
            next_order_id: 1,
        }
    }

    fn balance(&self, asset: &str) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    fn credit(&mut self, asset: &str, amount: Decimal) {
        *self
            .balances
            .entry(asset.to_string())
            .or_insert(Decimal::ZERO) += amount;
    }
}

/// 실시간 체결 스트림에 대해 주문을 시뮬레이션하는 모의 거래소.
///
/// `MarketDataStream`의 체결 알림을 구독하여 틱마다 미체결 주문의 체결
/// 조건을 평가하고, 체결 시 잔고를 원자적으로 갱신합니다. 모의투자와
/// 백테스팅 양쪽에서 동일하게 사용됩니다.
pub struct PaperExchange {
    /// 수수료율 등 설정
    config: PaperTradingConfig,
    /// 시장 데이터 스트림
    stream: Arc<MarketDataStream>,
    /// 잔고/주문 상태
    state: Mutex<PaperState>,
}

impl PaperExchange {
    /// 새 모의 거래소를 생성하고 스트림의 체결 알림에 연결합니다.
    ///
    /// 등록되는 콜백은 Weak 참조를 잡으므로 스트림의 리스너 목록이
    /// 거래소 수명을 붙잡지 않습니다.
    pub fn new(config: PaperTradingConfig, stream: Arc<MarketDataStream>) -> Arc<Self> {
        let state = PaperState::new(&config.initial_balances);
        let exchange = Arc::new(Self {
            config,
            stream,
            state: Mutex::new(state),
        });

        let weak: Weak<PaperExchange> = Arc::downgrade(&exchange);
        exchange.stream.add_trade_handler(Arc::new(move |tick| {
            if let Some(exchange) = weak.upgrade() {
                exchange.handle_trade(tick);
            }
        }));

        exchange
    }

    /// 시장 데이터 스트림을 반환합니다.
    pub fn stream(&self) -> &Arc<MarketDataStream> {
        &self.stream
    }

    // === 주문 API ===

    /// 새 주문을 추가하고 주문 ID를 반환합니다.
    ///
    /// 페어의 체결 채널 구독을 보장한 뒤(없으면 자동 구독), 캐시된 최근
    /// 틱으로 즉시 체결을 시도합니다. 가격 조건이 이미 충족된 주문은
    /// 이 시점에 바로 체결됩니다.
    pub async fn add_order(&self, request: OrderRequest) -> ExchangeResult<String> {
        Self::validate_order(&request)?;

        let symbol = request.symbol.clone();
        let id = {
            let mut state = self.state.lock().unwrap();
            let id = state.next_order_id.to_string();
            state.next_order_id += 1;
            let order = OpenOrder::from_request(id.clone(), request);
            state.open_orders.insert(id.clone(), order);
            id
        };

        if self.stream.get_subscription_status(Channel::Trade, &symbol, None)
            == SubscriptionStatus::Unsubscribed
        {
            self.stream
                .subscribe(Channel::Trade, &[symbol.clone()], None)
                .await?;
        }

        let tick = self.stream.get_last_trade(&symbol);
        if !tick.is_zero() {
            self.try_fill(&id, &tick);
        }

        debug!(order_id = %id, symbol = %symbol, "Order added");
        Ok(id)
    }

    /// 미체결 주문을 취소합니다.
    ///
    /// 알 수 없는 ID는 에러입니다. 취소는 잔고에 영향을 주지 않습니다.
    pub fn cancel_order(&self, id: &str) -> ExchangeResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.open_orders.remove(id) {
            Some(order) => {
                state.trailing_marks.remove(id);
                info!(order_id = %id, symbol = %order.symbol, "Order cancelled");
                Ok(())
            }
            None => Err(ExchangeError::OrderNotFound(id.to_string())),
        }
    }

    // === 조회 API ===

    /// 자산별 잔고를 반환합니다.
    pub fn get_balances(&self) -> HashMap<String, Decimal> {
        self.state.lock().unwrap().balances.clone()
    }

    /// 특정 자산의 잔고를 반환합니다.
    pub fn get_balance(&self, asset: &str) -> Decimal {
        self.state.lock().unwrap().balance(asset)
    }

    /// 미체결 주문 목록을 반환합니다.
    pub fn get_open_orders(&self) -> Vec<OpenOrder> {
        self.state.lock().unwrap().open_orders.values().cloned().collect()
    }

    /// 체결 완료 주문 이력을 반환합니다.
    pub fn get_closed_orders(&self) -> Vec<ClosedOrder> {
        self.state.lock().unwrap().closed_orders.clone()
    }

    // === 체결 처리 ===

    /// 체결 틱 하나를 처리합니다.
    ///
    /// 스트림의 이벤트 전달 컨텍스트에서 동기적으로 호출됩니다. 해당
    /// 페어의 미체결 주문을 순회하며 체결을 시도합니다. 체결된 주문은
    /// 순회 도중 제거되므로 ID 목록을 먼저 수집합니다.
    fn handle_trade(&self, tick: &TradeTick) {
        let ids: Vec<String> = {
            let state = self.state.lock().unwrap();
            state
                .open_orders
                .values()
                .filter(|order| order.symbol == tick.symbol)
                .map(|order| order.id.clone())
                .collect()
        };

        for id in ids {
            self.try_fill(&id, tick);
        }
    }

    /// 단일 주문의 체결을 시도합니다.
    ///
    /// 잔고 부족 시 주문은 미체결 상태로 남고 상태는 변경되지 않습니다.
    fn try_fill(&self, id: &str, tick: &TradeTick) {
        let mut state = self.state.lock().unwrap();

        let order = match state.open_orders.get(id) {
            Some(order) => order.clone(),
            None => return,
        };

        let fill_price = match Self::trigger_price(&mut state, &order, tick.price) {
            Some(price) => price,
            None => return,
        };

        if let Err(err) =
            Self::execute_fill(&mut state, self.config.fee_rate, &order, fill_price, tick.timestamp)
        {
            warn!(order_id = %id, symbol = %order.symbol, %err, "Fill attempt failed");
        }
    }

    /// 틱 가격 `p`에 대해 주문의 체결 조건을 평가합니다.
    ///
    /// 체결되어야 하면 체결 가격을 반환합니다. 트레일링 주문의 극값은
    /// 주문 생성 후 처음 관측된 가격으로 시드됩니다.
    fn trigger_price(state: &mut PaperState, order: &OpenOrder, p: Price) -> Option<Price> {
        match order.order_type {
            OrderType::Market => Some(p),
            OrderType::Limit => {
                let limit = order.price?;
                let triggered = match order.side {
                    Side::Buy => p <= limit,
                    Side::Sell => p >= limit,
                };
                // 지정가 주문은 지정가로 체결
                triggered.then_some(limit)
            }
            OrderType::StopLoss => {
                let stop = order.stop_price?;
                let triggered = match order.side {
                    Side::Buy => p >= stop,
                    Side::Sell => p <= stop,
                };
                triggered.then_some(stop)
            }
            OrderType::TrailingStopLoss => {
                let delta = order.trailing_delta?;
                let mark = state
                    .trailing_marks
                    .entry(order.id.clone())
                    .or_insert(p);

                let triggered = match order.side {
                    Side::Buy => {
                        if p < *mark {
                            *mark = p;
                        }
                        p >= *mark * (Decimal::ONE + delta)
                    }
                    Side::Sell => {
                        if p > *mark {
                            *mark = p;
                        }
                        p <= *mark * (Decimal::ONE - delta)
                    }
                };
                // 트레일링 주문은 틱 가격으로 체결
                triggered.then_some(p)
            }
        }
    }

    /// 체결을 실행합니다: 잔고 갱신과 미체결→체결 이동이 한 락 안에서
    /// 일어납니다.
    fn execute_fill(
        state: &mut PaperState,
        fee_rate: Decimal,
        order: &OpenOrder,
        fill_price: Price,
        filled_at: DateTime<Utc>,
    ) -> ExchangeResult<()> {
        let cost = fill_price * order.quantity;
        let fee = cost * fee_rate;

        match order.side {
            Side::Buy => {
                let debit = cost + fee;
                if state.balance(&order.symbol.quote) < debit {
                    return Err(ExchangeError::InsufficientBalance(format!(
                        "need {} {}, have {}",
                        debit,
                        order.symbol.quote,
                        state.balance(&order.symbol.quote)
                    )));
                }
                state.credit(&order.symbol.quote, -debit);
                state.credit(&order.symbol.base, order.quantity);
            }
            Side::Sell => {
                if state.balance(&order.symbol.base) < order.quantity {
                    return Err(ExchangeError::InsufficientBalance(format!(
                        "need {} {}, have {}",
                        order.quantity,
                        order.symbol.base,
                        state.balance(&order.symbol.base)
                    )));
                }
                state.credit(&order.symbol.base, -order.quantity);
                state.credit(&order.symbol.quote, cost - fee);
            }
        }

        state.open_orders.remove(&order.id);
        state.trailing_marks.remove(&order.id);
        state.closed_orders.push(ClosedOrder {
            id: order.id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity,
            fill_price,
            filled_at,
        });

        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            side = %order.side,
            price = %fill_price,
            quantity = %order.quantity,
            "Order filled"
        );
        Ok(())
    }

    /// 주문 요청을 검증합니다.
    fn validate_order(request: &OrderRequest) -> ExchangeResult<()> {
        if request.quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(
                "quantity must be positive".to_string(),
            ));
        }

        match request.order_type {
            OrderType::Limit if request.price.is_none() => Err(ExchangeError::InvalidOrder(
                "limit order requires price".to_string(),
            )),
            OrderType::StopLoss if request.stop_price.is_none() => Err(
                ExchangeError::InvalidOrder("stop order requires stop price".to_string()),
            ),
            OrderType::TrailingStopLoss
                if request.trailing_delta.map_or(true, |d| d <= Decimal::ZERO) =>
            {
                Err(ExchangeError::InvalidOrder(
                    "trailing stop order requires positive delta".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingAdapter;
    use cointrader_core::{MarketConfig, Symbol};
    use rust_decimal_macros::dec;

    fn create_test_symbol() -> Symbol {
        Symbol::new("BTC", "GBP")
    }

    fn create_test_exchange(balances: &[(&str, Decimal)]) -> (Arc<PaperExchange>, Arc<MarketDataStream>) {
        let adapter = Arc::new(CountingAdapter::new("paper-test"));
        let stream = Arc::new(MarketDataStream::new(adapter, MarketConfig::default()));

        let mut config = PaperTradingConfig::empty().with_fee_rate(dec!(0.001));
        for (asset, amount) in balances {
            config = config.with_initial_balance(asset, *amount);
        }

        let exchange = PaperExchange::new(config, stream.clone());
        (exchange, stream)
    }

    fn tick(price: Decimal) -> TradeTick {
        TradeTick::new(create_test_symbol(), price, dec!(1), Utc::now())
    }

    #[tokio::test]
    async fn test_add_order_auto_subscribes() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(100))]);

        let id = exchange
            .add_order(OrderRequest::limit_buy(create_test_symbol(), dec!(1), dec!(10)))
            .await
            .unwrap();

        assert_eq!(id, "1");
        assert_eq!(
            stream.get_subscription_status(Channel::Trade, &create_test_symbol(), None),
            SubscriptionStatus::Initialising
        );
        assert_eq!(exchange.get_open_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_market_order_fills_on_tick() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(1000))]);

        exchange
            .add_order(OrderRequest::market_buy(create_test_symbol(), dec!(2)))
            .await
            .unwrap();
        stream.on_trade(tick(dec!(100)));

        assert!(exchange.get_open_orders().is_empty());
        let closed = exchange.get_closed_orders();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].fill_price, dec!(100));

        // cost 200, fee 0.2
        assert_eq!(exchange.get_balance("BTC"), dec!(2));
        assert_eq!(exchange.get_balance("GBP"), dec!(799.8));
    }

    #[tokio::test]
    async fn test_limit_buy_fills_at_limit_price() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(100))]);

        exchange
            .add_order(OrderRequest::limit_buy(create_test_symbol(), dec!(1), dec!(10)))
            .await
            .unwrap();

        // 지정가보다 유리한 틱에서도 체결 가격은 지정가
        stream.on_trade(tick(dec!(9)));

        let closed = exchange.get_closed_orders();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].fill_price, dec!(10));

        assert_eq!(exchange.get_balance("BTC"), dec!(1));
        // 100 - 10 - 10*0.001
        assert_eq!(exchange.get_balance("GBP"), dec!(89.99));
    }

    #[tokio::test]
    async fn test_limit_buy_waits_above_limit() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(100))]);

        exchange
            .add_order(OrderRequest::limit_buy(create_test_symbol(), dec!(1), dec!(10)))
            .await
            .unwrap();
        stream.on_trade(tick(dec!(11)));

        assert_eq!(exchange.get_open_orders().len(), 1);
        assert!(exchange.get_closed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_order_open() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(5))]);

        exchange
            .add_order(OrderRequest::limit_buy(create_test_symbol(), dec!(1), dec!(10)))
            .await
            .unwrap();
        stream.on_trade(tick(dec!(9)));

        // 주문은 자동 취소되지 않고 미체결로 남는다
        assert_eq!(exchange.get_open_orders().len(), 1);
        assert!(exchange.get_closed_orders().is_empty());
        assert_eq!(exchange.get_balance("GBP"), dec!(5));
        assert_eq!(exchange.get_balance("BTC"), dec!(0));
    }

    #[tokio::test]
    async fn test_immediate_fill_from_cached_tick() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(100))]);

        // 먼저 구독과 틱이 존재
        stream
            .subscribe(Channel::Trade, &[create_test_symbol()], None)
            .await
            .unwrap();
        stream.on_trade(tick(dec!(9)));

        // 조건이 이미 충족된 주문은 add_order에서 바로 체결
        exchange
            .add_order(OrderRequest::limit_buy(create_test_symbol(), dec!(1), dec!(10)))
            .await
            .unwrap();

        assert!(exchange.get_open_orders().is_empty());
        assert_eq!(exchange.get_closed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_loss_sell() {
        let (exchange, stream) = create_test_exchange(&[("BTC", dec!(1))]);

        exchange
            .add_order(OrderRequest::stop_loss_sell(
                create_test_symbol(),
                dec!(1),
                dec!(90),
            ))
            .await
            .unwrap();

        stream.on_trade(tick(dec!(95)));
        assert_eq!(exchange.get_open_orders().len(), 1);

        stream.on_trade(tick(dec!(88)));
        let closed = exchange.get_closed_orders();
        assert_eq!(closed.len(), 1);
        // 체결 가격은 스톱 가격
        assert_eq!(closed[0].fill_price, dec!(90));
    }

    #[tokio::test]
    async fn test_trailing_stop_buy_scenario() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(1000))]);

        exchange
            .add_order(OrderRequest::trailing_stop_buy(
                create_test_symbol(),
                dec!(1),
                dec!(0.1),
            ))
            .await
            .unwrap();

        // 21에서 극값 시드, 15에서 새 최저가, 17 >= 15*1.1에서 체결
        stream.on_trade(tick(dec!(21)));
        assert_eq!(exchange.get_open_orders().len(), 1);

        stream.on_trade(tick(dec!(15)));
        assert_eq!(exchange.get_open_orders().len(), 1);

        stream.on_trade(tick(dec!(17)));
        let closed = exchange.get_closed_orders();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].fill_price, dec!(17));
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let (exchange, _stream) = create_test_exchange(&[("GBP", dec!(100))]);

        let id = exchange
            .add_order(OrderRequest::limit_buy(create_test_symbol(), dec!(1), dec!(10)))
            .await
            .unwrap();

        exchange.cancel_order(&id).unwrap();
        assert!(exchange.get_open_orders().is_empty());
        assert_eq!(exchange.get_balance("GBP"), dec!(100));

        assert!(matches!(
            exchange.cancel_order("unknown"),
            Err(ExchangeError::OrderNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_order_ids_are_monotonic() {
        let (exchange, _stream) = create_test_exchange(&[("GBP", dec!(100))]);
        let symbol = create_test_symbol();

        let a = exchange
            .add_order(OrderRequest::limit_buy(symbol.clone(), dec!(1), dec!(1)))
            .await
            .unwrap();
        let b = exchange
            .add_order(OrderRequest::limit_buy(symbol, dec!(1), dec!(1)))
            .await
            .unwrap();

        assert_eq!(a, "1");
        assert_eq!(b, "2");
    }

    #[tokio::test]
    async fn test_validation_rejects_incomplete_orders() {
        let (exchange, _stream) = create_test_exchange(&[("GBP", dec!(100))]);
        let symbol = create_test_symbol();

        let mut request = OrderRequest::limit_buy(symbol.clone(), dec!(1), dec!(10));
        request.price = None;
        assert!(matches!(
            exchange.add_order(request).await,
            Err(ExchangeError::InvalidOrder(_))
        ));

        let request = OrderRequest::market_buy(symbol, dec!(0));
        assert!(matches!(
            exchange.add_order(request).await,
            Err(ExchangeError::InvalidOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_balances_stay_exact_over_many_fills() {
        let (exchange, stream) = create_test_exchange(&[("GBP", dec!(1000000))]);
        let symbol = create_test_symbol();
        let price = dec!(123.45);
        let fee_rate = dec!(0.001);

        let mut expected_gbp = dec!(1000000);
        let mut expected_btc = Decimal::ZERO;

        for i in 0..5000u32 {
            // 수량을 바꿔 가며 매수 후 동일 수량 매도
            let quantity = Decimal::new(1 + i64::from(i % 7), 2); // 0.01 ~ 0.07

            exchange
                .add_order(OrderRequest::market_buy(symbol.clone(), quantity))
                .await
                .unwrap();
            stream.on_trade(tick(price));

            exchange
                .add_order(OrderRequest::market_sell(symbol.clone(), quantity))
                .await
                .unwrap();
            stream.on_trade(tick(price));

            let cost = price * quantity;
            expected_gbp -= cost + cost * fee_rate;
            expected_btc += quantity;
            expected_gbp += cost - cost * fee_rate;
            expected_btc -= quantity;
        }

        // 고정 소수점 연산이므로 1 서브유닛의 오차도 없어야 한다
        assert_eq!(exchange.get_balance("GBP"), expected_gbp);
        assert_eq!(exchange.get_balance("BTC"), expected_btc);
        assert_eq!(exchange.get_closed_orders().len(), 10000);
    }
}
