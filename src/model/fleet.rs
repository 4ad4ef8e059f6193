use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Car,
    Motorcycle,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Car => "car",
            AssetKind::Motorcycle => "motorcycle",
        }
    }

    // Label dipakai di email
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Car => "Mobil",
            AssetKind::Motorcycle => "Motor",
        }
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "car" => Ok(AssetKind::Car),
            "motorcycle" => Ok(AssetKind::Motorcycle),
            other => Err(format!("unknown fleet type: {}", other)),
        }
    }
}

// Armada yang bisa disewa (read-only dari sisi booking)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub daily_rate: Decimal,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
}
