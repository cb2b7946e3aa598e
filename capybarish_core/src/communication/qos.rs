//! Quality-of-service profiles for publishers and subscriptions.
//!
//! A [`QoSProfile`] is a plain value copied into every endpoint at creation time.
//! History and depth shape each subscription's own queue; durability is a
//! property of the topic and must agree between all participants.

use crate::error::{CapyError, CapyResult};
use serde::{Deserialize, Serialize};

/// Reliability policy for message delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    Reliable,
    BestEffort,
}

/// History policy for a subscription's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum History {
    /// Keep the newest `depth` messages, evicting the oldest on overflow
    KeepLast,
    /// Unbounded queue
    KeepAll,
}

/// Durability policy for late-joining subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Volatile,
    /// The topic retains its most recent message for late joiners
    TransientLocal,
}

/// Delivery policy bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QoSProfile {
    pub reliability: Reliability,
    pub history: History,
    pub depth: usize,
    pub durability: Durability,
}

impl Default for QoSProfile {
    /// Reliable, keep-last 10, volatile
    fn default() -> Self {
        Self {
            reliability: Reliability::Reliable,
            history: History::KeepLast,
            depth: 10,
            durability: Durability::Volatile,
        }
    }
}

impl QoSProfile {
    /// Best effort with a small queue, for high-rate sensor streams
    pub fn sensor_data() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast,
            depth: 5,
            durability: Durability::Volatile,
        }
    }

    /// Reliable, depth 10, volatile
    pub fn services() -> Self {
        Self::default()
    }

    /// Reliable single-slot profile that keeps the last value for late joiners
    pub fn parameters() -> Self {
        Self {
            reliability: Reliability::Reliable,
            history: History::KeepLast,
            depth: 1,
            durability: Durability::TransientLocal,
        }
    }

    /// Default profile with a custom queue depth
    pub fn with_depth(depth: usize) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }

    /// Default profile with an unbounded queue
    pub fn keep_all() -> Self {
        Self {
            history: History::KeepAll,
            ..Self::default()
        }
    }

    pub fn reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn is_transient_local(&self) -> bool {
        self.durability == Durability::TransientLocal
    }

    /// Reject profiles that cannot back a queue
    pub fn validate(&self) -> CapyResult<()> {
        if self.history == History::KeepLast && self.depth == 0 {
            return Err(CapyError::invalid_input(
                "QoS depth must be positive under KeepLast history",
            ));
        }
        Ok(())
    }
}
