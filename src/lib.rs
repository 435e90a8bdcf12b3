pub mod agent;
pub mod applier;
pub mod bot;
pub mod config;
pub mod decision_engine;
pub mod error;
pub mod http_client;
pub mod keyword_tools;
pub mod metrics;
pub mod monitoring;
pub mod providers;
pub mod report;
pub mod scheduler;
pub mod summary;
pub mod telemetry;
pub mod trends;
