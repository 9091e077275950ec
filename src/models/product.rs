use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product as owned by the (external) catalog store. The core only reads
/// these fields; `current_price >= 0` is an invariant enforced by the
/// catalog, not re-validated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub cost: Option<Decimal>,
    pub current_price: Decimal,
    pub stock: Option<i64>,
    pub active: bool,
}
