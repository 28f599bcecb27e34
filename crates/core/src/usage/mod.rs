//! # Usage Accounting
//!
//! Token and cost accounting across every model call of a run.

pub mod aggregator;
pub mod pricing;
pub mod record;

pub use aggregator::{with_commas, TokenCounts, UsageAggregator, UsageReport, UsageTotals};
pub use pricing::{format_cost, Cost, ModelPrice, PricingTable, ReasoningRate};
pub use record::{OperationTag, UsagePayload, UsageRecord};
