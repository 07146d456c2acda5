//! Error aggregation for per-batch partial failures.

use std::fmt;

/// Ordered collection of non-fatal errors gathered while processing a batch.
///
/// Every pipeline stage returns its partial result alongside one of these;
/// the caller always keeps the result and decides what to do with the
/// errors.
#[derive(Debug, Default)]
pub struct Errors {
    errors: Vec<anyhow::Error>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<anyhow::Error>) {
        self.errors.push(err.into());
    }

    pub fn extend(&mut self, other: Errors) {
        self.errors.extend(other.errors);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &anyhow::Error> {
        self.errors.iter()
    }

    /// Consume the collection; `Err` only when at least one error was
    /// recorded.
    pub fn into_result(self) -> Result<(), Errors> {
        if self.errors.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors: ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err:#}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}
