//! 정밀한 금융 계산을 위한 Decimal 유틸리티.
//!
//! 모든 금액 연산은 `rust_decimal::Decimal`로 수행합니다. Decimal은 정수
//! 가수와 스케일로 표현되는 고정 소수점 타입이므로, 수천 번의 체결을
//! 누적해도 부동소수점 오차가 발생하지 않습니다.

use rust_decimal::Decimal;

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// 퍼센트 타입 (0.01 = 1%).
pub type Percentage = Decimal;

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// 지정된 소수점 자릿수로 반올림합니다.
    fn round_money(&self, dp: u32) -> Decimal;

    /// 퍼센트 문자열로 변환합니다 (예: "5.25%").
    fn to_percentage_string(&self) -> String;
}

impl DecimalExt for Decimal {
    fn round_money(&self, dp: u32) -> Decimal {
        self.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
    }

    fn to_percentage_string(&self) -> String {
        let pct = *self * Decimal::from(100);
        format!("{:.2}%", pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_money() {
        assert_eq!(dec!(1.23456).round_money(2), dec!(1.23));
        assert_eq!(dec!(1.005).round_money(2), dec!(1.01));
    }

    #[test]
    fn test_percentage_string() {
        assert_eq!(dec!(0.0525).to_percentage_string(), "5.25%");
    }
}
