pub mod assessment;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod ledger;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod processor;
pub mod sources;
pub mod storage;
pub mod types;
