//! Field validation policies applied before any value reaches the document.
//!
//! Every rule is a pure function of `(kind, raw value)`: calling [`validate`]
//! twice with the same input yields the same result.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Longest network code accepted by SeisComP.
pub const NETWORK_CODE_MAX: usize = 8;
/// Longest station, location and stream code.
pub const CODE_MAX: usize = 10;
/// Longest name, description or free-text value.
pub const TEXT_MAX: usize = 255;

const MAX_RATE_DENOMINATOR: i64 = 10_000;
const MAX_RATE_NUMERATOR: f64 = 1e12;
const RATE_TOLERANCE: f64 = 1e-6;

/// Value policy attached to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Degrees north, within [-90, 90].
    Latitude,
    /// Degrees east, within [-180, 180].
    Longitude,
    /// Metres above sea level; any finite value.
    Elevation,
    /// Metres below the surface; any finite value.
    Depth,
    /// Any finite, non-zero value.
    Gain,
    /// Samples per second; strictly positive and expressible as a fraction.
    SampleRate,
    /// Hertz; strictly positive.
    Frequency,
    /// Degrees clockwise from north, within [0, 360].
    Azimuth,
    /// Degrees from horizontal, within [-90, 90].
    Dip,
    /// Any finite value that is not negative.
    NonNegative,
    Integer,
    /// Integer that is not negative (channel indices).
    Count,
    Boolean,
    /// RFC 3339 timestamp or a plain `YYYY-MM-DD` date.
    Time,
    /// Non-empty identifier without whitespace.
    Code { max_len: usize },
    /// Like [`FieldKind::Code`] but may be empty.
    LocationCode,
    Name,
    Description,
    /// Free text, may be empty.
    Text,
    /// `publicID` of another object.
    Reference,
}

impl FieldKind {
    pub const CODE: FieldKind = FieldKind::Code { max_len: CODE_MAX };
    pub const NETWORK_CODE: FieldKind = FieldKind::Code {
        max_len: NETWORK_CODE_MAX,
    };

    /// True for kinds validated as floating-point numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldKind::Latitude
                | FieldKind::Longitude
                | FieldKind::Elevation
                | FieldKind::Depth
                | FieldKind::Gain
                | FieldKind::SampleRate
                | FieldKind::Frequency
                | FieldKind::Azimuth
                | FieldKind::Dip
                | FieldKind::NonNegative
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Latitude => "latitude",
            FieldKind::Longitude => "longitude",
            FieldKind::Elevation => "elevation",
            FieldKind::Depth => "depth",
            FieldKind::Gain => "gain",
            FieldKind::SampleRate => "sample-rate",
            FieldKind::Frequency => "frequency",
            FieldKind::Azimuth => "azimuth",
            FieldKind::Dip => "dip",
            FieldKind::NonNegative => "non-negative",
            FieldKind::Integer => "integer",
            FieldKind::Count => "count",
            FieldKind::Boolean => "boolean",
            FieldKind::Time => "time",
            FieldKind::Code { max_len } if *max_len == NETWORK_CODE_MAX => "network-code",
            FieldKind::Code { .. } => "code",
            FieldKind::LocationCode => "location-code",
            FieldKind::Name => "name",
            FieldKind::Description => "description",
            FieldKind::Text => "text",
            FieldKind::Reference => "reference",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field kind: {0}")]
pub struct UnknownFieldKind(pub String);

impl FromStr for FieldKind {
    type Err = UnknownFieldKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            // Without an axis the tighter latitude bounds apply.
            "coordinate" | "latitude" | "lat" => FieldKind::Latitude,
            "longitude" | "lon" => FieldKind::Longitude,
            "elevation" => FieldKind::Elevation,
            "depth" => FieldKind::Depth,
            "gain" => FieldKind::Gain,
            "sample-rate" | "samplerate" => FieldKind::SampleRate,
            "frequency" => FieldKind::Frequency,
            "azimuth" => FieldKind::Azimuth,
            "dip" => FieldKind::Dip,
            "non-negative" => FieldKind::NonNegative,
            "integer" => FieldKind::Integer,
            "count" => FieldKind::Count,
            "boolean" | "bool" => FieldKind::Boolean,
            "time" => FieldKind::Time,
            "code" => FieldKind::CODE,
            "network-code" => FieldKind::NETWORK_CODE,
            "location-code" => FieldKind::LocationCode,
            "name" => FieldKind::Name,
            "description" => FieldKind::Description,
            "text" => FieldKind::Text,
            "reference" => FieldKind::Reference,
            _ => return Err(UnknownFieldKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Parsed representation of an accepted value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Bool(bool),
    Time(OffsetDateTime),
    Date(Date),
    Text(String),
    /// Sample rate as stored by SeisComP.
    Rate { numerator: i64, denominator: i64 },
}

/// The rule a rejected value broke.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rule {
    #[error("not a number")]
    NotANumber,
    #[error("not an integer")]
    NotAnInteger,
    #[error("must be finite")]
    NotFinite,
    #[error("must be within [{min}, {max}]")]
    OutOfRange { min: f64, max: f64 },
    #[error("must be non-zero")]
    Zero,
    #[error("must be greater than zero")]
    NotPositive,
    #[error("must not be negative")]
    Negative,
    #[error("must not be empty")]
    Empty,
    #[error("must be at most {max} characters, got {len}")]
    TooLong { max: usize, len: usize },
    #[error("must not contain whitespace")]
    Whitespace,
    #[error("expected true or false")]
    NotABoolean,
    #[error("expected an RFC 3339 timestamp or a YYYY-MM-DD date")]
    NotATime,
    #[error("cannot be written as numerator/denominator")]
    NotRational,
}

/// A value rejected by [`validate`], with the kind, the input and the rule.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} value {value:?} rejected: {rule}")]
pub struct ValidationError {
    pub kind: FieldKind,
    pub value: String,
    pub rule: Rule,
}

/// Check `raw` against the policy of `kind`. Surrounding whitespace is ignored.
pub fn validate(kind: FieldKind, raw: &str) -> Result<FieldValue, ValidationError> {
    check(kind, raw.trim()).map_err(|rule| ValidationError {
        kind,
        value: raw.to_string(),
        rule,
    })
}

fn check(kind: FieldKind, value: &str) -> Result<FieldValue, Rule> {
    match kind {
        FieldKind::Latitude => float_within(value, -90.0, 90.0),
        FieldKind::Longitude => float_within(value, -180.0, 180.0),
        FieldKind::Elevation | FieldKind::Depth => float(value).map(FieldValue::Float),
        FieldKind::Gain => {
            let gain = float(value)?;
            if gain == 0.0 {
                return Err(Rule::Zero);
            }
            Ok(FieldValue::Float(gain))
        }
        FieldKind::SampleRate => {
            let rate = positive(value)?;
            let (numerator, denominator) = rational(rate).ok_or(Rule::NotRational)?;
            Ok(FieldValue::Rate {
                numerator,
                denominator,
            })
        }
        FieldKind::Frequency => positive(value).map(FieldValue::Float),
        FieldKind::Azimuth => float_within(value, 0.0, 360.0),
        FieldKind::Dip => float_within(value, -90.0, 90.0),
        FieldKind::NonNegative => {
            let number = float(value)?;
            if number < 0.0 {
                return Err(Rule::Negative);
            }
            Ok(FieldValue::Float(number))
        }
        FieldKind::Integer => integer(value).map(FieldValue::Integer),
        FieldKind::Count => {
            let count = integer(value)?;
            if count < 0 {
                return Err(Rule::Negative);
            }
            Ok(FieldValue::Integer(count))
        }
        FieldKind::Boolean => match value {
            "true" | "1" => Ok(FieldValue::Bool(true)),
            "false" | "0" => Ok(FieldValue::Bool(false)),
            "" => Err(Rule::Empty),
            _ => Err(Rule::NotABoolean),
        },
        FieldKind::Time => timestamp(value),
        FieldKind::Code { max_len } => {
            non_empty(value)?;
            identifier(value, max_len)
        }
        FieldKind::LocationCode => identifier(value, CODE_MAX),
        FieldKind::Name | FieldKind::Description | FieldKind::Reference => {
            non_empty(value)?;
            text(value)
        }
        FieldKind::Text => text(value),
    }
}

fn non_empty(value: &str) -> Result<(), Rule> {
    if value.is_empty() {
        Err(Rule::Empty)
    } else {
        Ok(())
    }
}

fn float(value: &str) -> Result<f64, Rule> {
    non_empty(value)?;
    let number: f64 = value.parse().map_err(|_| Rule::NotANumber)?;
    if !number.is_finite() {
        return Err(Rule::NotFinite);
    }
    Ok(number)
}

fn float_within(value: &str, min: f64, max: f64) -> Result<FieldValue, Rule> {
    let number = float(value)?;
    if number < min || number > max {
        return Err(Rule::OutOfRange { min, max });
    }
    Ok(FieldValue::Float(number))
}

fn positive(value: &str) -> Result<f64, Rule> {
    let number = float(value)?;
    if number <= 0.0 {
        return Err(Rule::NotPositive);
    }
    Ok(number)
}

fn integer(value: &str) -> Result<i64, Rule> {
    non_empty(value)?;
    value.parse().map_err(|_| Rule::NotAnInteger)
}

fn identifier(value: &str, max_len: usize) -> Result<FieldValue, Rule> {
    if value.chars().any(char::is_whitespace) {
        return Err(Rule::Whitespace);
    }
    bounded(value, max_len)
}

fn text(value: &str) -> Result<FieldValue, Rule> {
    bounded(value, TEXT_MAX)
}

fn bounded(value: &str, max: usize) -> Result<FieldValue, Rule> {
    let len = value.chars().count();
    if len > max {
        return Err(Rule::TooLong { max, len });
    }
    Ok(FieldValue::Text(value.to_string()))
}

fn timestamp(value: &str) -> Result<FieldValue, Rule> {
    non_empty(value)?;
    if let Ok(time) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(FieldValue::Time(time));
    }
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map(FieldValue::Date)
        .map_err(|_| Rule::NotATime)
}

/// Express a positive rate as the smallest `numerator/denominator` pair that
/// reproduces it within a relative tolerance.
pub fn rational(rate: f64) -> Option<(i64, i64)> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    for denominator in 1..=MAX_RATE_DENOMINATOR {
        let scaled = rate * denominator as f64;
        if scaled > MAX_RATE_NUMERATOR {
            return None;
        }
        let numerator = scaled.round();
        if numerator >= 1.0 && (scaled - numerator).abs() <= RATE_TOLERANCE * scaled.max(1.0) {
            return Some((numerator as i64, denominator));
        }
    }
    None
}

/// Render `numerator/denominator` as the shortest decimal that reads back to
/// the same rate.
pub fn format_rate(numerator: i64, denominator: i64) -> Option<String> {
    if denominator == 0 {
        return None;
    }
    let rate = numerator as f64 / denominator as f64;
    if rate.fract() == 0.0 {
        Some(format!("{}", rate as i64))
    } else {
        Some(format!("{rate}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_of(kind: FieldKind, value: &str) -> Rule {
        validate(kind, value).expect_err("value should be rejected").rule
    }

    #[test]
    fn coordinate_ranges() {
        let coordinate: FieldKind = "coordinate".parse().expect("kind");
        assert!(validate(coordinate, "45.0").is_ok());
        assert!(matches!(
            rule_of(coordinate, "91.0"),
            Rule::OutOfRange { min, max } if min == -90.0 && max == 90.0
        ));
        assert!(validate(FieldKind::Latitude, "-90").is_ok());
        assert!(validate(FieldKind::Longitude, "179.99").is_ok());
        assert!(validate(FieldKind::Longitude, "-180.5").is_err());
        assert_eq!(rule_of(FieldKind::Latitude, "north"), Rule::NotANumber);
        assert_eq!(rule_of(FieldKind::Latitude, ""), Rule::Empty);
    }

    #[test]
    fn sample_rate_policy() {
        let kind: FieldKind = "sample-rate".parse().expect("kind");
        assert_eq!(rule_of(kind, "0"), Rule::NotPositive);
        assert_eq!(rule_of(kind, "-20"), Rule::NotPositive);
        assert_eq!(
            validate(kind, "100").expect("100 Hz"),
            FieldValue::Rate {
                numerator: 100,
                denominator: 1
            }
        );
        assert_eq!(
            validate(kind, " 0.1 ").expect("0.1 Hz"),
            FieldValue::Rate {
                numerator: 1,
                denominator: 10
            }
        );
        assert_eq!(
            validate(kind, "2.5").expect("2.5 Hz"),
            FieldValue::Rate {
                numerator: 5,
                denominator: 2
            }
        );
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        for value in ["NaN", "inf", "-infinity"] {
            assert_eq!(rule_of(FieldKind::Elevation, value), Rule::NotFinite);
            assert_eq!(rule_of(FieldKind::Gain, value), Rule::NotFinite);
        }
        assert!(validate(FieldKind::Depth, "-1500.25").is_ok());
    }

    #[test]
    fn gain_must_be_non_zero() {
        assert_eq!(rule_of(FieldKind::Gain, "0"), Rule::Zero);
        assert_eq!(rule_of(FieldKind::Gain, "-0.0"), Rule::Zero);
        assert_eq!(
            validate(FieldKind::Gain, "-629145000").expect("negative gain"),
            FieldValue::Float(-629_145_000.0)
        );
    }

    #[test]
    fn orientation_and_frequency() {
        assert!(validate(FieldKind::Azimuth, "360").is_ok());
        assert!(validate(FieldKind::Azimuth, "361").is_err());
        assert!(validate(FieldKind::Dip, "-90").is_ok());
        assert!(validate(FieldKind::Dip, "90.1").is_err());
        assert_eq!(rule_of(FieldKind::Frequency, "0"), Rule::NotPositive);
        assert_eq!(rule_of(FieldKind::NonNegative, "-1e-3"), Rule::Negative);
    }

    #[test]
    fn codes_and_text() {
        assert!(validate(FieldKind::NETWORK_CODE, "GE").is_ok());
        assert!(matches!(
            rule_of(FieldKind::NETWORK_CODE, "TOOLONGNET"),
            Rule::TooLong { max: 8, len: 10 }
        ));
        assert_eq!(rule_of(FieldKind::CODE, "   "), Rule::Empty);
        assert_eq!(rule_of(FieldKind::CODE, "A B"), Rule::Whitespace);
        assert_eq!(
            validate(FieldKind::CODE, "  APE ").expect("trimmed"),
            FieldValue::Text("APE".into())
        );
        assert!(validate(FieldKind::LocationCode, "").is_ok());
        assert!(validate(FieldKind::Text, "").is_ok());
        assert_eq!(rule_of(FieldKind::Description, ""), Rule::Empty);
        let long = "x".repeat(TEXT_MAX + 1);
        assert!(matches!(rule_of(FieldKind::Name, &long), Rule::TooLong { .. }));
    }

    #[test]
    fn times_and_booleans() {
        assert!(matches!(
            validate(FieldKind::Time, "2001-01-01T00:00:00.0000Z"),
            Ok(FieldValue::Time(_))
        ));
        assert!(matches!(
            validate(FieldKind::Time, "2001-01-01"),
            Ok(FieldValue::Date(_))
        ));
        assert_eq!(rule_of(FieldKind::Time, "yesterday"), Rule::NotATime);
        assert_eq!(
            validate(FieldKind::Boolean, "false").expect("bool"),
            FieldValue::Bool(false)
        );
        assert_eq!(rule_of(FieldKind::Boolean, "yes"), Rule::NotABoolean);
        assert_eq!(rule_of(FieldKind::Count, "-1"), Rule::Negative);
        assert_eq!(rule_of(FieldKind::Integer, "1.5"), Rule::NotAnInteger);
    }

    #[test]
    fn kind_names_roundtrip_through_display() {
        let kinds = [
            FieldKind::Latitude,
            FieldKind::Longitude,
            FieldKind::SampleRate,
            FieldKind::NETWORK_CODE,
            FieldKind::CODE,
            FieldKind::LocationCode,
            FieldKind::Reference,
        ];
        for kind in kinds {
            let parsed: FieldKind = kind.to_string().parse().expect("parse display name");
            assert_eq!(parsed, kind);
        }
        assert!("colour".parse::<FieldKind>().is_err());
    }

    #[test]
    fn rate_helpers() {
        assert_eq!(rational(20.0), Some((20, 1)));
        assert_eq!(rational(0.05), Some((1, 20)));
        assert_eq!(rational(0.0), None);
        assert_eq!(format_rate(1, 10).as_deref(), Some("0.1"));
        assert_eq!(format_rate(100, 1).as_deref(), Some("100"));
        assert_eq!(format_rate(5, 0), None);
    }
}
