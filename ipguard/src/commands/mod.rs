pub mod check;
pub mod config_schema;
pub mod healthcheck;
pub mod run;
pub mod sweep;
pub mod unban;
