//! Score bands for the `red`, `yellow` and `green` keywords.

/// Integer values that the colour keywords parse to.
///
/// Set once at startup (usually from the `[scores]` table of the engine
/// config) and passed into [`parse_score`](crate::parse_score) explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoreBands {
    pub red: i32,
    pub yellow: i32,
    pub green: i32,
}

impl ScoreBands {
    /// Look up a colour keyword (case-insensitive).
    pub fn lookup(&self, keyword: &str) -> Option<i32> {
        if keyword.eq_ignore_ascii_case("red") {
            Some(self.red)
        } else if keyword.eq_ignore_ascii_case("yellow") {
            Some(self.yellow)
        } else if keyword.eq_ignore_ascii_case("green") {
            Some(self.green)
        } else {
            None
        }
    }
}
