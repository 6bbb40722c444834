//! Library crate for infra-scan-rs exposing reusable modules.
pub mod advisory;
pub mod aggregate;
pub mod ai;
pub mod enrich;
pub mod favicon;
pub mod fingerprint;
pub mod http;
pub mod localscan;
pub mod probe;
pub mod ratelimit;
pub mod runner;
pub mod score;
pub mod store;
pub mod targets;
pub mod types;
