use std::{cmp::Ordering, fmt, str::FromStr};

/// A Kubernetes resource quantity (e.g. `500m`, `2`, `64Mi`, `1.5G`, `1e3`).
///
/// Quantities are compared by value, not by their textual form, so `1000m`
/// equals `1` and `1Gi` is greater than `1G`. Values are held in milli-units;
/// fractions below one milli-unit round up, matching the API server.
#[derive(Clone, Debug)]
pub struct Quantity {
    millis: i128,
    text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource quantity: {0:?}")]
pub struct QuantityParseError(String);

/// Quantities may be written as YAML strings or bare numbers.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum QuantityRepr {
    Integer(i64),
    Float(f64),
    Text(String),
}

// Limits the mantissa so that scaling by the largest suffix cannot overflow.
const MAX_DIGITS: usize = 18;

// === impl Quantity ===

impl Quantity {
    pub fn as_millis(&self) -> i128 {
        self.millis
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for Quantity {
    type Err = QuantityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let invalid = || QuantityParseError(s.to_string());

        let (negative, unsigned) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let split = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(split);
        let (int, frac) = number.split_once('.').unwrap_or((number, ""));
        if (int.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(invalid());
        }

        let digits = format!("{int}{frac}");
        let digits = digits.trim_start_matches('0');
        if digits.len() > MAX_DIGITS {
            return Err(invalid());
        }
        let mantissa = if digits.is_empty() {
            0
        } else {
            digits.parse::<i128>().map_err(|_| invalid())?
        };

        let (binary, decimal) = parse_suffix(suffix).ok_or_else(invalid)?;
        // Milli-units shift the decimal exponent by three.
        let exp = decimal + 3 - frac.len() as i32;

        let scaled = mantissa.checked_mul(1i128 << binary).ok_or_else(invalid)?;
        let millis = if exp >= 0 {
            10i128
                .checked_pow(exp as u32)
                .and_then(|m| scaled.checked_mul(m))
                .ok_or_else(invalid)?
        } else {
            match 10i128.checked_pow(exp.unsigned_abs()) {
                Some(div) => (scaled + div - 1) / div,
                // The value is smaller than any representable unit.
                None if scaled == 0 => 0,
                None => 1,
            }
        };

        Ok(Self {
            millis: if negative { -millis } else { millis },
            text: text.to_string(),
        })
    }
}

/// Returns the (power-of-two, power-of-ten) scale for a quantity suffix.
fn parse_suffix(suffix: &str) -> Option<(u32, i32)> {
    let scale = match suffix {
        "" => (0, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        "Ki" => (10, 0),
        "Mi" => (20, 0),
        "Gi" => (30, 0),
        "Ti" => (40, 0),
        "Pi" => (50, 0),
        "Ei" => (60, 0),
        s => {
            let exp = s.strip_prefix(['e', 'E'])?;
            let exp = exp.parse::<i32>().ok()?;
            if !(-30..=30).contains(&exp) {
                return None;
            }
            (0, exp)
        }
    };
    Some(scale)
}

impl TryFrom<QuantityRepr> for Quantity {
    type Error = QuantityParseError;

    fn try_from(repr: QuantityRepr) -> Result<Self, Self::Error> {
        match repr {
            QuantityRepr::Integer(n) => n.to_string().parse(),
            QuantityRepr::Float(f) => f.to_string().parse(),
            QuantityRepr::Text(s) => s.parse(),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Quantity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = QuantityRepr::deserialize(deserializer)?;
        Self::try_from(repr).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.text.fmt(f)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        s.parse().expect("quantity must parse")
    }

    #[test]
    fn parses_cpu_quantities() {
        assert_eq!(q("1").as_millis(), 1000);
        assert_eq!(q("500m").as_millis(), 500);
        assert_eq!(q("0.5").as_millis(), 500);
        assert_eq!(q("1.25").as_millis(), 1250);
        assert_eq!(q("1000m"), q("1"));
        assert_eq!(q("2k").as_millis(), 2_000_000);
    }

    #[test]
    fn parses_memory_quantities() {
        assert_eq!(q("1Ki").as_millis(), 1024 * 1000);
        assert_eq!(q("64Mi").as_millis(), 64 * (1 << 20) * 1000);
        assert_eq!(q("1.5Gi").as_millis(), 3 * (1 << 29) * 1000);
        assert!(q("1Gi") > q("1G"));
        assert_eq!(q("1e3"), q("1k"));
        assert_eq!(q("1E"), q("1000P"));
    }

    #[test]
    fn rounds_sub_milli_values_up() {
        assert_eq!(q("1u").as_millis(), 1);
        assert_eq!(q("0n").as_millis(), 0);
        assert_eq!(q("1.0001m").as_millis(), 2);
    }

    #[test]
    fn compares_by_value() {
        assert!(q("100m") < q("0.2"));
        assert!(q("-1") < q("0"));
        assert!(q("4Gi") > q("4000Mi"));
    }

    #[test]
    fn rejects_malformed_quantities() {
        for s in ["", "abc", "1.2.3", "1Xi", "1 Gi", ".", "m", "1e", "9999999999999999999Ei"] {
            assert!(s.parse::<Quantity>().is_err(), "{s:?} must not parse");
        }
    }

    #[test]
    fn displays_original_text() {
        assert_eq!(q("64Mi").to_string(), "64Mi");
    }
}
