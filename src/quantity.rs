//! Kubernetes resource quantities compared by value.
//!
//! Storage sizes in a spec and on a live claim are compared after parsing, so
//! `1Gi` and `1024Mi` are the same request. Values are held in milli-units,
//! rounded up the way the API server rounds sub-milli fractions.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParsedQuantity {
    millis: i128,
}

impl ParsedQuantity {
    pub fn as_millis(&self) -> i128 {
        self.millis
    }

    pub fn is_positive(&self) -> bool {
        self.millis > 0
    }
}

impl fmt::Display for ParsedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.millis % 1000 == 0 {
            write!(f, "{}", self.millis / 1000)
        } else {
            write!(f, "{}m", self.millis)
        }
    }
}

/// Scale applied by a suffix, as `numerator / denominator`.
struct Scale {
    numerator: i128,
    denominator: i128,
}

impl Scale {
    const fn times(numerator: i128) -> Self {
        Self {
            numerator,
            denominator: 1,
        }
    }
}

pub fn parse(input: &str) -> Result<ParsedQuantity> {
    let invalid = |reason| Error::InvalidQuantity {
        value: input.to_string(),
        reason,
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty quantity"));
    }

    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("missing number"));
    }
    if fraction.contains('.') {
        return Err(invalid("more than one decimal point"));
    }

    let digits = format!("{whole}{fraction}");
    let mantissa: i128 = digits
        .parse()
        .map_err(|_| invalid("number out of range"))?;
    let fraction_scale = pow10(fraction.len() as u32).ok_or_else(|| invalid("too many decimals"))?;

    let scale = suffix_scale(suffix).ok_or_else(|| invalid("unknown suffix"))??;

    let numerator = mantissa
        .checked_mul(scale.numerator)
        .and_then(|v| v.checked_mul(1000))
        .ok_or_else(|| invalid("number out of range"))?;
    let denominator = fraction_scale
        .checked_mul(scale.denominator)
        .ok_or_else(|| invalid("number out of range"))?;

    let mut millis = numerator / denominator;
    if numerator % denominator != 0 {
        millis += 1;
    }

    Ok(ParsedQuantity {
        millis: if negative { -millis } else { millis },
    })
}

/// Parses both sides and compares them by value.
pub fn same_quantity(a: &str, b: &str) -> Result<bool> {
    Ok(parse(a)? == parse(b)?)
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}

/// `None` for an unknown suffix, `Some(Err)` for an exponent out of range.
fn suffix_scale(suffix: &str) -> Option<Result<Scale>> {
    let binary = |power: u32| Scale::times(1i128 << (10 * power));
    let decimal = |power: u32| Scale::times(10i128.pow(3 * power));

    let scale = match suffix {
        "" => Scale::times(1),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        "m" => Scale {
            numerator: 1,
            denominator: 1000,
        },
        "k" => decimal(1),
        "M" => decimal(2),
        "G" => decimal(3),
        "T" => decimal(4),
        "P" => decimal(5),
        "E" => decimal(6),
        _ => return exponent_scale(suffix),
    };
    Some(Ok(scale))
}

fn exponent_scale(suffix: &str) -> Option<Result<Scale>> {
    let exponent = suffix.strip_prefix(['e', 'E'])?;
    let exponent: i32 = exponent.parse().ok()?;
    let out_of_range = || Error::InvalidQuantity {
        value: suffix.to_string(),
        reason: "exponent out of range",
    };

    let magnitude = match pow10(exponent.unsigned_abs()) {
        Some(m) => m,
        None => return Some(Err(out_of_range())),
    };
    Some(Ok(if exponent >= 0 {
        Scale::times(magnitude)
    } else {
        Scale {
            numerator: 1,
            denominator: magnitude,
        }
    }))
}
