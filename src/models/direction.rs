use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Directional bias derived from the most recent confirmed structure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

impl Bias {
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            Bias::Bullish => Some(Direction::Long),
            Bias::Bearish => Some(Direction::Short),
            Bias::Neutral => None,
        }
    }

    pub fn matches(self, direction: Direction) -> bool {
        self.to_direction() == Some(direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingKind {
    High,
    Low,
}

impl fmt::Display for SwingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwingKind::High => write!(f, "high"),
            SwingKind::Low => write!(f, "low"),
        }
    }
}

/// Confirmed structure break classification.
///
/// BOS continues the prevailing trend; CHoCH is the first break against it;
/// MSS is a counter-trend break backed by displacement through an inducement
/// sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    Bos,
    Choch,
    Mss,
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureKind::Bos => write!(f, "BOS"),
            StructureKind::Choch => write!(f, "CHoCH"),
            StructureKind::Mss => write!(f, "MSS"),
        }
    }
}

/// Position of an order block within the current leg's hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockClass {
    Decision,
    Extreme,
    Trap,
    Invalid,
}

impl fmt::Display for BlockClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockClass::Decision => write!(f, "decision"),
            BlockClass::Extreme => write!(f, "extreme"),
            BlockClass::Trap => write!(f, "trap"),
            BlockClass::Invalid => write!(f, "invalid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Premium,
    Discount,
    Equilibrium,
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKind::Premium => write!(f, "premium"),
            ZoneKind::Discount => write!(f, "discount"),
            ZoneKind::Equilibrium => write!(f, "equilibrium"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Direct,
    Confirmation,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Direct => write!(f, "type1_direct"),
            EntryType::Confirmation => write!(f, "type2_confirmation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlSource {
    Structural,
    AtrFallback,
}

impl fmt::Display for SlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlSource::Structural => write!(f, "structural"),
            SlSource::AtrFallback => write!(f, "atr_fallback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TpSource {
    Liquidity,
    AtrFallback,
}

impl fmt::Display for TpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpSource::Liquidity => write!(f, "liquidity"),
            TpSource::AtrFallback => write!(f, "atr_fallback"),
        }
    }
}

/// Side of the book a liquidity pool sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolSide {
    #[serde(rename = "BSL")]
    Bsl,
    #[serde(rename = "SSL")]
    Ssl,
}

impl fmt::Display for PoolSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolSide::Bsl => write!(f, "BSL"),
            PoolSide::Ssl => write!(f, "SSL"),
        }
    }
}
