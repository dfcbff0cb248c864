//! Rolling a parsed spec into face values and a total.

use rand::Rng;

use crate::error::DiceError;
use crate::spec::RollSpec;

/// Outcome of rolling a spec: per-die face strings in generation order,
/// plus the integer total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollOutcome {
    pub values: Vec<String>,
    pub total: i64,
}

/// Roll every die of `spec` using the given RNG.
///
/// Per-die semantics by face count:
/// - 4/6/8/12/20: uniform in `[1, faces]`, contributes its face value.
/// - 10: uniform in `[0, 9]`, contributes the draw directly.
/// - 100: uniform in `[0, 9]`, face string is the raw draw, contributes
///   draw × 10 (a tens-digit die, not a 1–100 percentile roll).
pub fn roll<R: Rng + ?Sized>(spec: &RollSpec, rng: &mut R) -> RollOutcome {
    let mut values = Vec::with_capacity(spec.die_count() as usize);
    let mut total: i64 = 0;

    for term in &spec.terms {
        for _ in 0..term.count {
            match term.faces {
                10 => {
                    let draw: i64 = rng.random_range(0..=9);
                    values.push(draw.to_string());
                    total += draw;
                }
                100 => {
                    let draw: i64 = rng.random_range(0..=9);
                    values.push(draw.to_string());
                    total += draw * 10;
                }
                faces => {
                    let draw: i64 = rng.random_range(1..=i64::from(faces));
                    values.push(draw.to_string());
                    total += draw;
                }
            }
        }
    }

    RollOutcome { values, total }
}

/// Parse and roll a spec string with the thread-local RNG.
pub fn roll_spec(spec: &str) -> Result<RollOutcome, DiceError> {
    let parsed = RollSpec::parse(spec)?;
    let mut rng = rand::rng();
    Ok(roll(&parsed, &mut rng))
}
