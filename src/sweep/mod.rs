pub mod audit;
pub mod config;
pub mod executor;
pub mod ledger;
pub mod matcher;
pub mod overrides;
pub mod paths;
pub mod reconcile;
pub mod records;
pub mod scanner;
pub mod servicenow;
pub mod util;
pub mod warn;
