//! Cumulative mature-supply ledger.
//!
//! The stake lottery weighs every height by how much matured supply it added.
//! It only needs the query side: `S(h)`, the total matured atoms issued up to
//! and including height `h`, non-decreasing in `h`.

use crate::error::StateError;

/// Query contract for the cumulative mature-supply ledger.
pub trait SupplyLedger {
    /// Cumulative matured atoms up to and including `height`.
    ///
    /// Must be non-decreasing in `height`.
    fn cumulative_mature_supply(&self, height: u64) -> u64;
}

/// In-memory ledger indexed by height (index 0 is genesis).
///
/// Heights past the last recorded entry report the last recorded value, which
/// keeps the query monotonic. An empty ledger reports zero everywhere.
#[derive(Clone, Debug, Default)]
pub struct MatureSupplyLedger {
    cumulative: Vec<u64>,
}

impl MatureSupplyLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from per-height cumulative values starting at genesis.
    pub fn from_cumulative(values: Vec<u64>) -> Result<Self, StateError> {
        let mut ledger = Self::new();
        for (height, value) in values.into_iter().enumerate() {
            ledger.record(height as u64, value)?;
        }
        Ok(ledger)
    }

    /// Record the cumulative value for the next height.
    pub fn record(&mut self, height: u64, cumulative: u64) -> Result<(), StateError> {
        let expected = self.cumulative.len() as u64;
        if height != expected {
            return Err(StateError::SupplyGap {
                expected,
                got: height,
            });
        }
        if let Some(&previous) = self.cumulative.last() {
            if cumulative < previous {
                return Err(StateError::NonMonotonicSupply {
                    height,
                    previous,
                    next: cumulative,
                });
            }
        }
        self.cumulative.push(cumulative);
        Ok(())
    }

    /// Record `matured` new atoms becoming mature at the next height.
    pub fn push_matured(&mut self, matured: u64) -> Result<(), StateError> {
        let height = self.cumulative.len() as u64;
        let previous = self.cumulative.last().copied().unwrap_or(0);
        let next = previous
            .checked_add(matured)
            .ok_or(StateError::NonMonotonicSupply {
                height,
                previous,
                next: u64::MAX,
            })?;
        self.record(height, next)
    }

    /// Highest recorded height, if any.
    pub fn tip_height(&self) -> Option<u64> {
        (self.cumulative.len() as u64).checked_sub(1)
    }
}

impl SupplyLedger for MatureSupplyLedger {
    fn cumulative_mature_supply(&self, height: u64) -> u64 {
        let idx = usize::try_from(height).unwrap_or(usize::MAX);
        self.cumulative
            .get(idx)
            .or_else(|| self.cumulative.last())
            .copied()
            .unwrap_or(0)
    }
}
