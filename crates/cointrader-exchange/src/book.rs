//! 깊이 제한 호가창 캐시.
//!
//! 한 페어의 호가창을 방향별 정렬 맵으로 유지합니다. 쓰기는 배타 락,
//! 스냅샷은 공유 락으로 보호되므로 스냅샷이 부분 업데이트를 관측하는
//! 일은 없습니다. 스냅샷 이후의 조회는 항상 스냅샷 이전에 반환된
//! 업데이트를 반영합니다.

use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::Utc;
use cointrader_core::{
    BookSide, OrderBook, OrderBookEntry, OrderBookLevel, Price, Quantity, Symbol,
};

/// 한 페어의 깊이 제한 호가창 캐시.
///
/// 깊이 0으로 생성하면 레벨 수 제한이 없습니다.
#[derive(Debug)]
pub struct OrderBookCache {
    /// 거래 심볼
    symbol: Symbol,
    /// 방향별 최대 레벨 수 (0 = 무제한)
    depth: usize,
    /// 가격으로 정렬된 양방향 레벨
    sides: RwLock<BookSides>,
}

#[derive(Debug, Default)]
struct BookSides {
    /// 매도 호가, 가격 오름차순
    asks: BTreeMap<Price, Quantity>,
    /// 매수 호가, 가격 오름차순 저장 (조회 시 역순)
    bids: BTreeMap<Price, Quantity>,
}

impl BookSides {
    fn side_mut(&mut self, side: BookSide) -> &mut BTreeMap<Price, Quantity> {
        match side {
            BookSide::Ask => &mut self.asks,
            BookSide::Bid => &mut self.bids,
        }
    }
}

impl OrderBookCache {
    /// 새 호가창 캐시를 생성합니다.
    pub fn new(symbol: Symbol, depth: usize) -> Self {
        Self {
            symbol,
            depth,
            sides: RwLock::new(BookSides::default()),
        }
    }

    /// 초기 레벨 목록으로 캐시를 생성합니다.
    pub fn with_levels(symbol: Symbol, depth: usize, entries: Vec<OrderBookEntry>) -> Self {
        let cache = Self::new(symbol, depth);
        for entry in entries {
            cache.update(entry);
        }
        cache
    }

    /// 이 캐시의 심볼을 반환합니다.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// 설정된 깊이를 반환합니다 (0 = 무제한).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 호가 레벨을 갱신합니다.
    ///
    /// 같은 가격의 레벨이 있으면 교체하고, 수량이 0이면 해당 레벨을
    /// 삭제합니다. 삽입으로 설정 깊이를 초과하면 가장 불리한 가격의
    /// 레벨을 잘라냅니다.
    pub fn update(&self, entry: OrderBookEntry) {
        let mut sides = self.sides.write().unwrap();
        let levels = sides.side_mut(entry.side);

        if entry.quantity.is_zero() {
            levels.remove(&entry.price);
            return;
        }

        levels.insert(entry.price, entry.quantity);

        if self.depth > 0 {
            while levels.len() > self.depth {
                // 최악 가격: 매도는 최고가, 매수는 최저가
                let worst = match entry.side {
                    BookSide::Ask => levels.keys().next_back().copied(),
                    BookSide::Bid => levels.keys().next().copied(),
                };
                match worst {
                    Some(price) => levels.remove(&price),
                    None => break,
                };
            }
        }
    }

    /// 지정 가격의 레벨을 삭제합니다. 없으면 아무 일도 하지 않습니다.
    pub fn remove(&self, price: Price, side: BookSide) {
        let mut sides = self.sides.write().unwrap();
        sides.side_mut(side).remove(&price);
    }

    /// 깊이 제한 스냅샷을 반환합니다.
    ///
    /// 방향별로 최량 가격부터 최대 `depth`개 레벨을 복사합니다 (매도는
    /// 최저가부터, 매수는 최고가부터). `depth` 0은 저장된 모든 레벨을
    /// 의미합니다. 여러 스냅샷은 동시에 진행될 수 있지만 갱신과는 절대
    /// 겹치지 않습니다.
    pub fn snapshot(&self, depth: usize) -> OrderBook {
        let sides = self.sides.read().unwrap();
        let take = if depth == 0 { usize::MAX } else { depth };

        let asks = sides
            .asks
            .iter()
            .take(take)
            .map(|(price, quantity)| OrderBookLevel {
                price: *price,
                quantity: *quantity,
            })
            .collect();

        let bids = sides
            .bids
            .iter()
            .rev()
            .take(take)
            .map(|(price, quantity)| OrderBookLevel {
                price: *price,
                quantity: *quantity,
            })
            .collect();

        OrderBook {
            symbol: self.symbol.clone(),
            bids,
            asks,
            timestamp: Utc::now(),
        }
    }

    /// 방향별 저장된 레벨 수를 반환합니다.
    pub fn len(&self, side: BookSide) -> usize {
        let sides = self.sides.read().unwrap();
        match side {
            BookSide::Ask => sides.asks.len(),
            BookSide::Bid => sides.bids.len(),
        }
    }

    /// 양방향 모두 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        let sides = self.sides.read().unwrap();
        sides.asks.is_empty() && sides.bids.is_empty()
    }
}
