use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// How far raw granules are consolidated after download.
///
/// Each level includes the levels below it: `Monthly` first merges days,
/// then rolls the daily files up into months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeGranularity {
    /// Keep the raw per-collection granules.
    Off,
    #[default]
    Daily,
    Monthly,
    Yearly,
}

impl MergeGranularity {
    pub fn merges_days(self) -> bool {
        self >= MergeGranularity::Daily
    }

    pub fn merges_months(self) -> bool {
        self >= MergeGranularity::Monthly
    }

    pub fn merges_years(self) -> bool {
        self == MergeGranularity::Yearly
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MergeGranularity::Off => "none",
            MergeGranularity::Daily => "daily",
            MergeGranularity::Monthly => "monthly",
            MergeGranularity::Yearly => "yearly",
        }
    }
}

impl Display for MergeGranularity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown merge granularity '{0}', expected one of none, daily, monthly, yearly")]
pub struct ParseMergeGranularityError(pub String);

impl FromStr for MergeGranularity {
    type Err = ParseMergeGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "false" => Ok(MergeGranularity::Off),
            "daily" | "day" => Ok(MergeGranularity::Daily),
            "monthly" | "month" => Ok(MergeGranularity::Monthly),
            "yearly" | "year" => Ok(MergeGranularity::Yearly),
            _ => Err(ParseMergeGranularityError(s.to_string())),
        }
    }
}
