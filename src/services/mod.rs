pub mod aggregator;
pub mod checkout;
pub mod orchestrator;
pub mod reconciliation;
pub mod validation;
