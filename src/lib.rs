//! oraprov - provisioning and teardown of ephemeral Oracle accounts and
//! pluggable databases.
//!
//! The provisioning core works against the `Connection` abstraction; the
//! real driver lives behind the `oracle` feature.

pub mod cli;
pub mod config;
pub mod connection;
pub mod observability;
pub mod provisioning;
