pub mod audit;
pub mod authority;
pub mod columns;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod extract;
pub mod models;
pub mod output;
pub mod parish;
pub mod period;
pub mod pipeline;
pub mod reconcile;
pub mod table;
pub mod validation;
