//! Condition order assignment.
//!
//! Two policies are available: a fresh uniform shuffle per session, or a
//! Latin-square rotation driven by a persistent participant counter. The
//! counter itself lives in the caller's store; this module only computes the
//! next state from the current one.

pub mod latin_square;

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::models::Condition;

pub use latin_square::{all_orders, order_for_counter, order_number, LATIN_SQUARE_ORDERS};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    Random,
    LatinSquare,
}

impl Default for OrderMode {
    fn default() -> Self {
        OrderMode::LatinSquare
    }
}

impl OrderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderMode::Random => "random",
            OrderMode::LatinSquare => "latin_square",
        }
    }
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "random" | "shuffle" => Ok(OrderMode::Random),
            "latin_square" | "latin" => Ok(OrderMode::LatinSquare),
            other => Err(anyhow!("unknown order mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedOrder {
    pub order: Vec<Condition>,
    /// 1..=6, Latin-square only.
    pub order_number: Option<u8>,
    /// Counter value after this assignment; the caller must persist it.
    pub counter: Option<u64>,
}

/// Computes the order for one session start. `counter_state` is the last
/// persisted counter value (0 when none was ever written) and is ignored in
/// random mode.
pub fn compute_order<R: Rng + ?Sized>(
    mode: OrderMode,
    counter_state: u64,
    rng: &mut R,
) -> ComputedOrder {
    match mode {
        OrderMode::Random => {
            let mut order = Condition::ALL.to_vec();
            order.shuffle(rng);
            ComputedOrder {
                order,
                order_number: None,
                counter: None,
            }
        }
        OrderMode::LatinSquare => {
            let counter = counter_state.saturating_add(1);
            ComputedOrder {
                order: order_for_counter(counter).to_vec(),
                order_number: Some(order_number(counter)),
                counter: Some(counter),
            }
        }
    }
}
