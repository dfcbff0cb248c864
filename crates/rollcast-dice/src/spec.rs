//! Dice spec grammar: `NdM(+NdM)*`.

use std::fmt;
use std::str::FromStr;

use crate::error::DiceError;

/// Face counts accepted by the grammar.
pub const SUPPORTED_FACES: &[u32] = &[4, 6, 8, 10, 12, 20, 100];

/// A single `NdM` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceTerm {
    /// Number of dice to roll (≥ 1).
    pub count: u32,
    /// Faces per die. Must be one of [`SUPPORTED_FACES`].
    pub faces: u32,
}

/// A parsed dice spec: an ordered sequence of terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollSpec {
    pub terms: Vec<DiceTerm>,
}

impl RollSpec {
    /// Parse a spec string such as `"2d6+1d20"`.
    ///
    /// Terms are separated by `+`; each term is `NdM` with N ≥ 1 and M one
    /// of the supported face counts. Whitespace around terms is tolerated.
    pub fn parse(spec: &str) -> Result<Self, DiceError> {
        if spec.trim().is_empty() {
            return Err(DiceError::EmptySpec);
        }

        let mut terms = Vec::new();
        for raw in spec.split('+') {
            let raw = raw.trim();
            let (count_str, faces_str) = raw
                .split_once(['d', 'D'])
                .ok_or_else(|| DiceError::MalformedTerm(raw.to_string()))?;

            let count: u32 = count_str
                .trim()
                .parse()
                .map_err(|_| DiceError::InvalidCount(count_str.to_string()))?;
            if count == 0 {
                return Err(DiceError::InvalidCount(count_str.to_string()));
            }

            let faces: u32 = faces_str
                .trim()
                .parse()
                .map_err(|_| DiceError::MalformedTerm(raw.to_string()))?;
            if !SUPPORTED_FACES.contains(&faces) {
                return Err(DiceError::UnsupportedFaces(faces));
            }

            terms.push(DiceTerm { count, faces });
        }

        Ok(Self { terms })
    }

    /// Total number of individual dice across all terms.
    pub fn die_count(&self) -> u32 {
        self.terms.iter().map(|t| t.count).sum()
    }

    /// Face count of the first term.
    ///
    /// Used as the face parameter of the overlay render URL when a spec
    /// mixes die types.
    pub fn primary_faces(&self) -> u32 {
        self.terms.first().map(|t| t.faces).unwrap_or(6)
    }
}

impl FromStr for RollSpec {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RollSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .terms
            .iter()
            .map(|t| format!("{}d{}", t.count, t.faces))
            .collect();
        write!(f, "{}", rendered.join("+"))
    }
}
