use std::{io, path::PathBuf};

use chrono::NaiveDate;

use crate::fixedpoint::{Amount, AmountError};

/// Bad user input. Nothing is mutated when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Amount),
    #[error("invalid amount {input:?}: {source}")]
    InvalidAmount {
        input: String,
        #[source]
        source: AmountError,
    },
    #[error("unknown transaction type {0:?}, expected 'income' or 'expense'")]
    UnknownType(String),
    #[error("invalid date {0:?}, expected YYYY-MM-DD or DD-MM-YYYY")]
    InvalidDate(String),
    #[error("description cannot be empty")]
    EmptyDescription,
    #[error("category cannot be empty")]
    EmptyCategory,
    #[error("start date {from} is after end date {to}")]
    InvalidRange { from: NaiveDate, to: NaiveDate },
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("no transaction ids left to assign")]
    IdsExhausted,
    #[error("goal name cannot be empty")]
    EmptyGoalName,
    #[error("no goal named {0:?}")]
    UnknownGoal(String),
    #[error("goal deadline {deadline} is before today ({today})")]
    DeadlinePassed { deadline: NaiveDate, today: NaiveDate },
    #[error("{} is part of the ledger, export to another path", .0.display())]
    ReservedPath(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("ledger file {} not found", .0.display())]
    NotFound(PathBuf),
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed file {}{}: {message}", path.display(), line_suffix(*line))]
    Format {
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },
}

fn line_suffix(line: Option<u64>) -> String {
    line.map(|line| format!(" at line {}", line))
        .unwrap_or_default()
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, line: Option<u64>, message: impl Into<String>) -> Self {
        LedgerError::Format {
            path: path.into(),
            line,
            message: message.into(),
        }
    }

    /// Process exit code for this failure; zero is reserved for success.
    pub fn exit_code(&self) -> u8 {
        match self {
            LedgerError::Validation(_) => 2,
            LedgerError::NotFound(_) | LedgerError::Io { .. } => 3,
            LedgerError::Format { .. } => 4,
        }
    }
}
