//! Token accounting and cost estimation for Reflace experiments.
//!
//! Every model response may carry token usage; loops record it in a
//! [`UsageLedger`], and the experiment driver prices it with a
//! [`PricingTable`] into per-task [`TaskMetrics`].

pub mod pricing;
pub mod usage;

pub use pricing::{ModelPricing, PricingTable};
pub use usage::{TaskMetrics, UsageLedger};
