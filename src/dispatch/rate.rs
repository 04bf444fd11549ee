//! Target dispatch rate and the open-loop schedule derived from it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const UNLIMITED: &str = "unlimited";

/// Target request arrival rate.
///
/// In config files this is either a number of requests per second or the
/// string `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
#[serde(try_from = "RateSetting", into = "RateSetting")]
pub enum TargetRate {
    /// Issue every request immediately; concurrency is bounded only by resources.
    #[default]
    Unlimited,
    /// Requests per second. Must be finite and positive once validated.
    PerSecond(f64),
}

impl TargetRate {
    /// Offset of the `index`-th dispatch from the start of the run.
    ///
    /// Fixed-interval open-loop schedule: `index / rate`, independent of how
    /// long earlier requests take. Always zero for `Unlimited`; `None` when the
    /// offset does not fit in a `Duration`.
    pub fn offset(&self, index: u64) -> Option<Duration> {
        match *self {
            TargetRate::Unlimited => Some(Duration::ZERO),
            TargetRate::PerSecond(rate) => Duration::try_from_secs_f64(index as f64 / rate).ok(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, TargetRate::Unlimited)
    }
}

impl fmt::Display for TargetRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRate::Unlimited => write!(f, "{}", UNLIMITED),
            TargetRate::PerSecond(rate) => write!(f, "{} req/s", rate),
        }
    }
}

/// Parses the CLI form: a number or `unlimited`.
impl FromStr for TargetRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.parse::<f64>() {
            Ok(rate) => Ok(TargetRate::PerSecond(rate)),
            Err(_) => TargetRate::try_from(RateSetting::Keyword(s.to_string())),
        }
    }
}

/// Wire representation of [`TargetRate`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum RateSetting {
    Number(f64),
    Keyword(String),
}

impl TryFrom<RateSetting> for TargetRate {
    type Error = String;

    fn try_from(value: RateSetting) -> Result<Self, Self::Error> {
        match value {
            RateSetting::Number(rate) => Ok(TargetRate::PerSecond(rate)),
            RateSetting::Keyword(word) if word.eq_ignore_ascii_case(UNLIMITED) => {
                Ok(TargetRate::Unlimited)
            }
            RateSetting::Keyword(word) => Err(format!(
                "invalid rate '{}': expected a number or \"{}\"",
                word, UNLIMITED
            )),
        }
    }
}

impl From<TargetRate> for RateSetting {
    fn from(rate: TargetRate) -> Self {
        match rate {
            TargetRate::Unlimited => RateSetting::Keyword(UNLIMITED.to_string()),
            TargetRate::PerSecond(rate) => RateSetting::Number(rate),
        }
    }
}
