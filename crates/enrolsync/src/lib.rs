//! Reconciles a local learner registry against two external sources of truth
//! (a stateful admission portal and a stateless verification API) and drives
//! the remote actions needed to bring the registry into agreement.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
