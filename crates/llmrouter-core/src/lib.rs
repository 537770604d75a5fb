//! Routing, health, and circuit-breaker core for an OpenAI-compatible LLM
//! gateway. This crate owns no HTTP server and speaks no provider wire
//! format directly -- it is the policy layer the gateway binary wires an
//! actix-web surface and concrete provider adapters around.

pub mod config;
pub mod logs;
pub mod models;
pub mod services;
