//! warden-failover — cooldown-gated failover decisions.
//!
//! Probe outcomes flow into the [`FailoverEngine`], which turns
//! newly-unhealthy nodes into at most one [`FailoverAction`] per
//! process-wide cooldown window. Everything else — nodes already known
//! to be down, and candidates arriving inside an active window — is
//! recorded but produces nothing. The engine never executes actions
//! itself; emission and execution stay in the orchestrator's hands.
//!
//! # Flap suppression
//!
//! The cooldown window is the sole throttle: a fleet of nodes going
//! unhealthy at once yields one action, and a node oscillating faster
//! than the window yields at most one action per window. The engine is
//! a plain state machine over `Idle ⇄ Cooldown`, with the window expiry
//! checked lazily on each evaluation rather than by a timer.

pub mod engine;
pub mod executor;

pub use engine::{CooldownState, FailoverAction, FailoverEngine};
pub use executor::{ActionExecutor, LogExecutor};
