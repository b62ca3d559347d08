//! Ingestion and alerting backend for monitored grid devices.
//!
//! Readings arrive over HTTP or MQTT, pass through the [`gateway::Gateway`],
//! land in a [`store::Store`], and are evaluated by the
//! [`engine::AlertEngine`]. The [`registry::Registry`] owns device identity
//! and connectivity.

pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod registry;
pub mod rest;
pub mod store;
pub mod validate;
pub mod wire;
