use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Address, Wei};

/// An indexed transaction as seen in a scanned block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub block_number: u64,
    pub from: Address,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: Wei,
    pub gas_price: Wei,
    pub gas_used: u64,
}

/// Which side of a transaction an indexed address was on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The address is the recipient
    Inbound,
    /// The address is the sender
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Direction::Inbound),
            "outbound" => Some(Direction::Outbound),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
