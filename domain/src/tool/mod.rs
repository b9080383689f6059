//! Tool domain: descriptors, argument validation and confirmation policy.
//!
//! A [`ToolDescriptor`](entities::ToolDescriptor) is the model-visible
//! contract of a tool. The [`schema`] module validates untrusted call
//! arguments against it; [`policy`] decides whether a particular call needs
//! the user's approval; [`catalog`] is the per-turn snapshot handed to the
//! model and the orchestrator.

pub mod catalog;
pub mod entities;
pub mod policy;
pub mod schema;
pub mod value_objects;
