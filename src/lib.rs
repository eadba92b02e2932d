//! One-time, time-bounded safe zones for clans.
//!
//! A clan member who opens a recognized object (a tool cupboard) is offered a
//! prompt; confirming it asks [`coordinator::ZoneClaimCoordinator`] to create
//! a protected zone around them, once per clan, within the activation window.

pub mod build_info;
pub mod clock;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod eligibility;
pub mod error;
pub mod model;
pub mod output;
pub mod runtime;
pub mod scenario;
pub mod scheduler;
pub mod session;
pub mod store;
