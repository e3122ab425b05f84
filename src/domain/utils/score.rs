use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use crate::error::ConversionError;

/// Placement score. Values at or beyond `±INFINITY` are mandatory (must / must not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Score(i64);

impl Score {
    pub const INFINITY: i64 = 1_000_000;

    pub const ZERO: Score = Score(0);
    pub const POSITIVE_INFINITY: Score = Score(Self::INFINITY);
    pub const NEGATIVE_INFINITY: Score = Score(-Self::INFINITY);

    pub fn new(value: i64) -> Self {
        Score(value.clamp(-Self::INFINITY, Self::INFINITY))
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_positive_infinity(self) -> bool {
        self.0 >= Self::INFINITY
    }

    pub fn is_negative_infinity(self) -> bool {
        self.0 <= -Self::INFINITY
    }

    pub fn is_infinite(self) -> bool {
        self.is_positive_infinity() || self.is_negative_infinity()
    }

    /// A node with this score may host the resource.
    pub fn is_allowed(self) -> bool {
        !self.is_negative_infinity()
    }

    /// Combines two scores: `-INF` beats everything, then `+INF`, otherwise a clamped sum.
    pub fn merge(self, other: Score) -> Score {
        if self.is_negative_infinity() || other.is_negative_infinity() {
            Score::NEGATIVE_INFINITY
        } else if self.is_positive_infinity() || other.is_positive_infinity() {
            Score::POSITIVE_INFINITY
        } else {
            Score::new(self.0.saturating_add(other.0))
        }
    }

    /// Scales a finite score, used for fail-count penalties. Infinite scores stay infinite.
    pub fn times(self, factor: i64) -> Score {
        if self.is_infinite() || factor == 0 {
            return if factor == 0 { Score::ZERO } else { self };
        }
        Score::new(self.0.saturating_mul(factor))
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        self.merge(rhs)
    }
}

impl From<i64> for Score {
    fn from(value: i64) -> Self {
        Score::new(value)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_positive_infinity() {
            write!(f, "INFINITY")
        } else if self.is_negative_infinity() {
            write!(f, "-INFINITY")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl FromStr for Score {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "infinity" | "+infinity" | "inf" | "+inf" => Ok(Score::POSITIVE_INFINITY),
            "-infinity" | "-inf" => Ok(Score::NEGATIVE_INFINITY),
            other => other.parse::<i64>().map(Score::new).map_err(|_| ConversionError::InvalidScore(s.to_string())),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_infinite() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_i64(self.0)
        }
    }
}

/// Accepts either a JSON number or one of the strings `"INFINITY"`, `"-INFINITY"`, `"+INFINITY"`.
impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Score::new(n)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_infinity_wins() {
        assert_eq!(Score::POSITIVE_INFINITY + Score::NEGATIVE_INFINITY, Score::NEGATIVE_INFINITY);
        assert_eq!(Score::new(500) + Score::NEGATIVE_INFINITY, Score::NEGATIVE_INFINITY);
    }

    #[test]
    fn test_sum_is_clamped() {
        assert_eq!(Score::new(900_000) + Score::new(900_000), Score::POSITIVE_INFINITY);
        assert_eq!(Score::new(-5) + Score::new(7), Score::new(2));
    }

    #[test]
    fn test_parse_infinity_strings() {
        assert_eq!("INFINITY".parse::<Score>().unwrap(), Score::POSITIVE_INFINITY);
        assert_eq!("-infinity".parse::<Score>().unwrap(), Score::NEGATIVE_INFINITY);
        assert_eq!("42".parse::<Score>().unwrap(), Score::new(42));
        assert!("lots".parse::<Score>().is_err());
    }

    #[test]
    fn test_deserialize_number_or_text() {
        let scores: Vec<Score> = serde_json::from_str(r#"[10, "-INFINITY", "+INFINITY"]"#).unwrap();
        assert_eq!(scores, vec![Score::new(10), Score::NEGATIVE_INFINITY, Score::POSITIVE_INFINITY]);
    }

    #[test]
    fn test_times_keeps_infinity() {
        assert_eq!(Score::new(-100).times(3), Score::new(-300));
        assert_eq!(Score::NEGATIVE_INFINITY.times(2), Score::NEGATIVE_INFINITY);
        assert_eq!(Score::NEGATIVE_INFINITY.times(0), Score::ZERO);
    }
}
