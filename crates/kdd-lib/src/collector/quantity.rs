//! Kubernetes resource quantity parsing.
//!
//! Values are kept as `mantissa * 10^exp10 * 2^exp2` so conversions to
//! milli-units or bytes round up exactly, without floating point drift.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuantity {
    mantissa: i128,
    exp10: i32,
    exp2: u32,
}

impl ParsedQuantity {
    /// Parse `250m`, `1.5`, `128Mi`, `1G`, `12345n`, `1e3` and friends.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let number_end = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
            .unwrap_or(raw.len());
        let (number, suffix) = raw.split_at(number_end);

        let (mut mantissa, mut exp10) = parse_decimal(number)?;
        let mut exp2 = 0;

        match suffix {
            "" => {}
            "n" => exp10 -= 9,
            "u" => exp10 -= 6,
            "m" => exp10 -= 3,
            "k" => exp10 += 3,
            "M" => exp10 += 6,
            "G" => exp10 += 9,
            "T" => exp10 += 12,
            "P" => exp10 += 15,
            "E" => exp10 += 18,
            "Ki" => exp2 = 10,
            "Mi" => exp2 = 20,
            "Gi" => exp2 = 30,
            "Ti" => exp2 = 40,
            "Pi" => exp2 = 50,
            "Ei" => exp2 = 60,
            other => {
                let exponent = other
                    .strip_prefix('e')
                    .or_else(|| other.strip_prefix('E'))?;
                exp10 = exp10.checked_add(exponent.parse::<i32>().ok()?)?;
            }
        }

        // Normalize trailing zeros so small exponents stay cheap.
        while mantissa != 0 && mantissa % 10 == 0 && exp10 < 0 {
            mantissa /= 10;
            exp10 += 1;
        }

        Some(Self {
            mantissa,
            exp10,
            exp2,
        })
    }

    /// Value in units of `10^scale`, rounded up and saturated to `i64`.
    pub fn scaled_value(&self, scale: i32) -> i64 {
        let exp = self.exp10 - scale;
        let Some(numerator) = 1i128
            .checked_shl(self.exp2)
            .and_then(|p| self.mantissa.checked_mul(p))
        else {
            return saturate(self.mantissa);
        };

        if exp >= 0 {
            let scaled = pow10(exp).and_then(|p| numerator.checked_mul(p));
            return scaled.map_or_else(|| saturate(numerator), saturate);
        }

        match pow10(-exp) {
            Some(denominator) => saturate(div_ceil(numerator, denominator)),
            // Divisor exceeds anything representable: the value rounds to 0 or 1.
            None => i64::from(numerator > 0),
        }
    }

    pub fn milli_value(&self) -> i64 {
        self.scaled_value(-3)
    }

    pub fn value(&self) -> i64 {
        self.scaled_value(0)
    }
}

fn parse_decimal(number: &str) -> Option<(i128, i32)> {
    let (negative, digits) = match number.as_bytes().first()? {
        b'-' => (true, &number[1..]),
        b'+' => (false, &number[1..]),
        _ => (false, number),
    };

    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut mantissa: i128 = 0;
    for c in whole.chars().chain(fraction.chars()) {
        mantissa = mantissa
            .checked_mul(10)?
            .checked_add(i128::from(c.to_digit(10)?))?;
    }
    let exp10 = -i32::try_from(fraction.len()).ok()?;

    Some((if negative { -mantissa } else { mantissa }, exp10))
}

fn pow10(exp: i32) -> Option<i128> {
    10i128.checked_pow(u32::try_from(exp).ok()?)
}

fn div_ceil(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    if numerator % denominator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

/// CPU in millicores; unparseable quantities count as zero.
pub fn cpu_millis(quantity: Option<&Quantity>) -> i64 {
    quantity
        .and_then(|q| ParsedQuantity::parse(&q.0))
        .map_or(0, |q| q.milli_value())
}

/// Memory in bytes; unparseable quantities count as zero.
pub fn bytes(quantity: Option<&Quantity>) -> i64 {
    quantity
        .and_then(|q| ParsedQuantity::parse(&q.0))
        .map_or(0, |q| q.value())
}

/// Value in units of `10^scale` (whole cores for CPU with scale 0,
/// megabytes for memory with scale 6).
pub fn scaled(quantity: Option<&Quantity>, scale: i32) -> i64 {
    quantity
        .and_then(|q| ParsedQuantity::parse(&q.0))
        .map_or(0, |q| q.scaled_value(scale))
}
