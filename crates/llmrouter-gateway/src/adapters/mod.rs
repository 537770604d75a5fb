//! Concrete provider adapters. The router core only knows the
//! [`llmrouter_core::services::provider::ProviderAdapter`] trait; this
//! module supplies the one implementation the gateway ships with.

pub mod openai_compatible;
