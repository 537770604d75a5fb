//! Data models and domain types for the llmrouter gateway core.
//!
//! This module contains the structures that flow through the routing
//! pipeline: the catalog a model is defined by, the runtime state a model
//! accrues, the request-facing routing types, the chat wire format, and the
//! error taxonomy everything else classifies into.
//!
//! # Module Organization
//!
//! - [`catalog`] - `ModelDefinition` and the override patches applied to it
//! - [`state`] - `ModelState`, circuit state, and sliding-window stats
//! - [`routing`] - priority-list parsing, tag DNF matching, `RoutingCriteria`
//! - [`chat`] - OpenAI-compatible message and completion wire types
//! - [`error`] - the classified-error taxonomy and subsystem error enums

pub mod catalog;
pub mod chat;
pub mod error;
pub mod routing;
pub mod state;
