//! tgraph-score: bounded integer scores.
//!
//! Scores weight placement decisions and synapse priorities. Every value
//! lives in `[-SCORE_INFINITY, +SCORE_INFINITY]` and all arithmetic
//! saturates at those bounds.
//!
//! # Components
//!
//! - **`score`**: parse, format and add scores; the `Score` value type
//! - **`bands`**: the `red`/`yellow`/`green` keyword values

pub mod bands;
pub mod score;

pub use bands::ScoreBands;
pub use score::{SCORE_INFINITY, Score, add_scores, clamp_score, format_score, parse_score};
