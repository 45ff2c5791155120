//! Turn identity: durable keys for turns and their reconciliation

mod key;
mod resolver;

pub use key::TurnKey;
pub use resolver::{IdentityEffect, Observation, PollPolicy, Turn, TurnIdentityResolver, TurnState};
