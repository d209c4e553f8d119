use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, fixedpoint::Amount};

/**
 * A savings target with a deadline. Contributions only move `saved`;
 * they are not ledger transactions and do not change the balance.
 *
 * Field order is the column order of the goals file.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub target: Amount,
    pub saved: Amount,
    pub deadline: NaiveDate,
}

impl Goal {
    /// A deadline of `today` is allowed, anything earlier is not.
    pub fn new(
        name: &str,
        target: Amount,
        deadline: NaiveDate,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyGoalName);
        }
        if !target.is_positive() {
            return Err(ValidationError::NonPositiveAmount(target));
        }
        if deadline < today {
            return Err(ValidationError::DeadlinePassed { deadline, today });
        }

        Ok(Goal {
            name: name.to_string(),
            target,
            saved: Amount::ZERO,
            deadline,
        })
    }

    /// Saved share of the target in thousandths; can pass 1000.
    pub fn progress_per_mille(&self) -> i64 {
        self.saved.per_mille_of(self.target)
    }

    pub fn remaining(&self) -> Amount {
        self.target.saturating_sub(self.saved).max(Amount::ZERO)
    }

    pub fn is_reached(&self) -> bool {
        self.saved >= self.target
    }

    /// Negative once the deadline has passed.
    pub fn days_left(&self, today: NaiveDate) -> i64 {
        (self.deadline - today).num_days()
    }
}
