//! Testing utilities
//!
//! Only compiled for tests.
//!
//! # Organization
//! - `mocks.rs` - In-memory broker implementing both client traits
//! - `helpers.rs` - Fixtures for envelopes, configs and consumers

#![cfg(test)]

pub mod helpers;
pub mod mocks;

pub use helpers::{
    consumer_config, drain, local_credentials, memory_consumer, producer_config, sample_envelope,
    sample_payment, Payment,
};
pub use mocks::{MemoryBroker, MemoryConsumer, MemoryProducer};
