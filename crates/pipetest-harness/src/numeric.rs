//! Exact comparison of JSON number literals.
//!
//! Two JSON numbers are equal when they denote the same mathematical value,
//! regardless of literal formatting (`42` vs `42.0`, `1624617166.182` vs
//! `1.624617166182E9`). The comparison works on the decimal literals
//! directly and never goes through floating point, so 64-bit-plus integers
//! keep full precision.

/// A number normalized to `digits * 10^exponent`, with `digits` carrying no
/// leading or trailing zeros. Zero is the empty digit string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Decimal {
    negative: bool,
    digits: String,
    exponent: i64,
}

fn parse_decimal(literal: &str) -> Option<Decimal> {
    let bytes = literal.as_bytes();
    let mut pos = 0;

    let negative = match bytes.first() {
        Some(b'-') => {
            pos += 1;
            true
        }
        Some(b'+') => {
            pos += 1;
            false
        }
        _ => false,
    };

    let int_start = pos;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    let int_digits = &literal[int_start..pos];

    let mut frac_digits = "";
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        let frac_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        frac_digits = &literal[frac_start..pos];
    }

    if int_digits.is_empty() && frac_digits.is_empty() {
        return None;
    }

    let mut exponent: i64 = 0;
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        pos += 1;
        let exp_negative = match bytes.get(pos) {
            Some(b'-') => {
                pos += 1;
                true
            }
            Some(b'+') => {
                pos += 1;
                false
            }
            _ => false,
        };
        let exp_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if exp_start == pos {
            return None;
        }
        let magnitude: i64 = literal[exp_start..pos].parse().ok()?;
        exponent = if exp_negative { -magnitude } else { magnitude };
    }

    if pos != bytes.len() {
        return None;
    }

    let mut digits = String::with_capacity(int_digits.len() + frac_digits.len());
    digits.push_str(int_digits);
    digits.push_str(frac_digits);
    exponent = exponent.checked_sub(i64::try_from(frac_digits.len()).ok()?)?;

    // Normalize: drop leading zeros, then trailing zeros (shifting the
    // exponent), so equal values compare structurally equal.
    let leading = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading);
    while digits.ends_with('0') {
        digits.pop();
        exponent = exponent.checked_add(1)?;
    }

    if digits.is_empty() {
        return Some(Decimal {
            negative: false,
            digits,
            exponent: 0,
        });
    }
    Some(Decimal {
        negative,
        digits,
        exponent,
    })
}

/// Exact mathematical equality of two number literals. Falls back to byte
/// equality when either side is not a valid JSON number literal.
#[must_use]
pub fn literals_equal(a: &str, b: &str) -> bool {
    match (parse_decimal(a), parse_decimal(b)) {
        (Some(left), Some(right)) => left == right,
        _ => a == b,
    }
}

/// Widest exponent rendered as zero padding; beyond it the canonical form
/// switches to normalized scientific notation so a single extreme literal
/// cannot balloon rendering to gigabytes.
const PLAIN_EXPONENT_LIMIT: i64 = 64;

/// Canonical rendering of a number literal: plain decimal (no exponent, no
/// trailing fraction zeros, `-0` folded to `0`) for ordinary magnitudes,
/// normalized `d.ddd e±N` scientific notation past `PLAIN_EXPONENT_LIMIT`.
/// Output size is O(digits). Unparseable input is returned unchanged.
#[must_use]
pub fn canonical(literal: &str) -> String {
    let Some(decimal) = parse_decimal(literal) else {
        return literal.to_owned();
    };
    if decimal.digits.is_empty() {
        return "0".to_owned();
    }

    let mut out = String::new();
    if decimal.negative {
        out.push('-');
    }
    let digit_count = i64::try_from(decimal.digits.len()).unwrap_or(i64::MAX);
    let point = digit_count.saturating_add(decimal.exponent);
    if decimal.exponent > PLAIN_EXPONENT_LIMIT || point < -PLAIN_EXPONENT_LIMIT {
        out.push_str(&decimal.digits[..1]);
        if decimal.digits.len() > 1 {
            out.push('.');
            out.push_str(&decimal.digits[1..]);
        }
        out.push('e');
        out.push_str(&decimal.exponent.saturating_add(digit_count - 1).to_string());
        return out;
    }
    if decimal.exponent >= 0 {
        out.push_str(&decimal.digits);
        for _ in 0..decimal.exponent {
            out.push('0');
        }
    } else if point > 0 {
        let split = usize::try_from(point).unwrap_or(decimal.digits.len());
        out.push_str(&decimal.digits[..split]);
        out.push('.');
        out.push_str(&decimal.digits[split..]);
    } else {
        out.push_str("0.");
        for _ in 0..(-point) {
            out.push('0');
        }
        out.push_str(&decimal.digits);
    }
    out
}
