//! Postino: a self-hosted email campaign platform.
//!
//! Owners manage contacts and templates, then launch campaigns that render a
//! template per recipient and deliver it over SMTP. The send pipeline runs on
//! a durable Postgres-backed job queue and reconciles per-recipient delivery
//! state back into campaign statistics.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
