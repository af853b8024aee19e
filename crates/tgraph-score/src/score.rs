//! Saturating score arithmetic.
//!
//! Scores are plain `i32` values bounded by [`SCORE_INFINITY`]. The bound is
//! far below `i32::MAX / 2`, so adding two in-range scores can never
//! overflow before the result is clamped.

use std::fmt;
use std::ops::Add;

use crate::bands::ScoreBands;

/// The sentinel treated as infinity. Anything at or beyond it is infinite.
pub const SCORE_INFINITY: i32 = 1_000_000;

const INFINITY_TEXT: &str = "INFINITY";
const PLUS_INFINITY_TEXT: &str = "+INFINITY";
const MINUS_INFINITY_TEXT: &str = "-INFINITY";

/// Clamp a wide integer into `[-SCORE_INFINITY, SCORE_INFINITY]`.
pub fn clamp_score(value: i64) -> i32 {
    value.clamp(-i64::from(SCORE_INFINITY), i64::from(SCORE_INFINITY)) as i32
}

/// Parse score text.
///
/// - `None` is 0.
/// - `INFINITY`, `+INFINITY` and `-INFINITY` (any case) are the bounds.
/// - `red`, `yellow` and `green` (any case) map through `bands`.
/// - Anything else is read as a base-10 integer prefix and clamped.
///
/// Text with no leading integer parses as 0. This leniency is kept for
/// compatibility with existing configurations; no error is reported.
pub fn parse_score(text: Option<&str>, bands: &ScoreBands) -> i32 {
    let Some(text) = text else {
        return 0;
    };
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case(MINUS_INFINITY_TEXT) {
        -SCORE_INFINITY
    } else if trimmed.eq_ignore_ascii_case(INFINITY_TEXT)
        || trimmed.eq_ignore_ascii_case(PLUS_INFINITY_TEXT)
    {
        SCORE_INFINITY
    } else if let Some(value) = bands.lookup(trimmed) {
        value
    } else {
        clamp_score(scan_integer_prefix(trimmed).unwrap_or(0))
    }
}

/// Read an optional sign followed by decimal digits, ignoring trailing text.
///
/// Saturates instead of overflowing so that very long digit strings still
/// clamp to the correct bound.
fn scan_integer_prefix(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };

    let mut value: i64 = 0;
    let mut seen = 0usize;
    for b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
        seen += 1;
    }

    if seen == 0 {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Render a score, spelling the bounds as `INFINITY` / `-INFINITY`.
pub fn format_score(score: i32) -> String {
    Score::new(i64::from(score)).to_string()
}

/// Add two scores, saturating at the bounds.
///
/// An infinite operand decides the result. When the operands are opposite
/// infinities, `-INFINITY` wins: a ban always outranks a preference.
pub fn add_scores(a: i32, b: i32) -> i32 {
    if a <= -SCORE_INFINITY || b <= -SCORE_INFINITY {
        return -SCORE_INFINITY;
    }
    if a >= SCORE_INFINITY || b >= SCORE_INFINITY {
        return SCORE_INFINITY;
    }
    clamp_score(i64::from(a) + i64::from(b))
}

/// A bounded score value.
///
/// Formatting through `Display` writes straight into the formatter, so
/// callers that log scores never share a format buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(i32);

impl Score {
    pub const INFINITY: Score = Score(SCORE_INFINITY);
    pub const MINUS_INFINITY: Score = Score(-SCORE_INFINITY);
    pub const ZERO: Score = Score(0);

    /// Build a score, clamping into range.
    pub fn new(value: i64) -> Self {
        Self(clamp_score(value))
    }

    /// Parse score text; see [`parse_score`].
    pub fn parse(text: Option<&str>, bands: &ScoreBands) -> Self {
        Self(parse_score(text, bands))
    }

    pub fn value(self) -> i32 {
        self.0
    }

    pub fn is_infinite(self) -> bool {
        self.0 >= SCORE_INFINITY || self.0 <= -SCORE_INFINITY
    }
}

impl From<i32> for Score {
    fn from(value: i32) -> Self {
        Self::new(i64::from(value))
    }
}

impl Add for Score {
    type Output = Score;

    fn add(self, rhs: Score) -> Score {
        Score(add_scores(self.0, rhs.0))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= SCORE_INFINITY {
            f.write_str(INFINITY_TEXT)
        } else if self.0 <= -SCORE_INFINITY {
            f.write_str(MINUS_INFINITY_TEXT)
        } else {
            write!(f, "{}", self.0)
        }
    }
}
