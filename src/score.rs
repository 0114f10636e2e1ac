use serde::Serialize;

/// Result of interpreting one piece of hand-typed score text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParsedScore {
    /// Empty input: the caller should clear any stored score.
    Clear,
    /// Text that does not parse yet. The stored value is left as it was.
    Invalid,
    #[serde(rename_all = "camelCase")]
    Score { value: f64, exceeds_max: bool },
}

impl ParsedScore {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Invalid => "invalid",
            Self::Score { .. } => "score",
        }
    }

    pub fn exceeds_max(self) -> bool {
        matches!(self, Self::Score { exceeds_max: true, .. })
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Self::Score { value, .. } => Some(value),
            _ => None,
        }
    }
}

pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Report-facing 1-decimal rounding: `Int(10*x + 0.5) / 10`.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn parse_number(s: &str) -> Option<f64> {
    let v: f64 = s.trim().parse().ok()?;
    v.is_finite().then_some(v)
}

fn parse_fraction(body: &str, max_score: f64) -> Option<f64> {
    let (num, den) = body.split_once('/')?;
    if den.contains('/') {
        return None;
    }
    let num = parse_number(num)?;
    let den = parse_number(den)?;
    if den <= 0.0 {
        return None;
    }
    Some(round_2_decimals((num / den) * max_score))
}

/// Pure and I/O free, so it is safe to call on every keystroke.
///
/// Accepted forms, in priority order:
/// - `""` clears the score;
/// - `=n/d` or `n/d` scales the fraction onto `max_score`;
/// - a plain decimal, rounded to 2 places.
///
/// Anything else (including negatives and non-finite numbers) is `Invalid`.
/// Values above `max_score` are kept and flagged, never clamped.
pub fn parse_score(raw: &str, max_score: f64) -> ParsedScore {
    let text = raw.trim();
    if text.is_empty() {
        return ParsedScore::Clear;
    }

    let value = if text.contains('/') {
        let body = text.strip_prefix('=').unwrap_or(text);
        parse_fraction(body, max_score)
    } else {
        parse_number(text).map(round_2_decimals)
    };

    match value {
        Some(v) if v >= 0.0 && v.is_finite() => ParsedScore::Score {
            value: v,
            exceeds_max: v > max_score,
        },
        _ => ParsedScore::Invalid,
    }
}
