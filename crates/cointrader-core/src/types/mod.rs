//! 공통 기본 타입.

mod decimal;
mod symbol;
mod timeframe;

pub use decimal::{DecimalExt, Percentage, Price, Quantity};
pub use symbol::Symbol;
pub use timeframe::Timeframe;
