//! Annotation grade value.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MIN_GRADE: u8 = 1;
pub const MAX_GRADE: u8 = 10;

/// Rejected grade input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradeError(pub i64);

impl Display for GradeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "grade must be an integer in [{MIN_GRADE}, {MAX_GRADE}], got {}",
            self.0
        )
    }
}

impl Error for GradeError {}

/// Integer grade in `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Grade(u8);

impl Grade {
    pub fn new(value: i64) -> Result<Self, GradeError> {
        if value < i64::from(MIN_GRADE) || value > i64::from(MAX_GRADE) {
            return Err(GradeError(value));
        }
        Ok(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Grade {
    type Error = GradeError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Grade> for i64 {
    fn from(value: Grade) -> Self {
        i64::from(value.0)
    }
}

impl Display for Grade {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
