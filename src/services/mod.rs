pub mod reconciliation;
pub mod review_aggregate;
pub mod user_service;
pub mod vote_ledger;
pub mod vote_service;
