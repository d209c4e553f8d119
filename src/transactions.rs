use std::{
    fmt::{self, Display},
    str::FromStr,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{error::ValidationError, fixedpoint::Amount};

pub const DEFAULT_CATEGORY: &str = "uncategorized";

const ISO_DATE: &str = "%Y-%m-%d";
const DAY_FIRST_DATE: &str = "%d-%m-%Y";

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    /// Sign is derived from the type, never stored with the amount.
    pub fn signed(self, amount: Amount) -> Amount {
        match self {
            TransactionType::Income => amount,
            TransactionType::Expense => -amount,
        }
    }
}

impl FromStr for TransactionType {
    type Err = ValidationError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            _ => Err(ValidationError::UnknownType(string.to_string())),
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        })
    }
}

/// A recorded entry. Field order is the on-disk column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: u32,
    pub r#type: TransactionType,
    pub amount: Amount,
    pub description: String,
    pub date: NaiveDate,
    pub category: String,
}

impl Transaction {
    pub fn signed_amount(&self) -> Amount {
        self.r#type.signed(self.amount)
    }
}

/// A validated transaction that has not been given an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub r#type: TransactionType,
    pub amount: Amount,
    pub description: String,
    pub date: NaiveDate,
    pub category: String,
}

impl NewTransaction {
    pub fn new(
        r#type: TransactionType,
        amount: Amount,
        description: &str,
        date: NaiveDate,
        category: &str,
    ) -> Result<Self, ValidationError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription);
        }
        let category = category.trim();
        if category.is_empty() {
            return Err(ValidationError::EmptyCategory);
        }

        Ok(NewTransaction {
            r#type,
            amount,
            description: description.to_string(),
            date,
            category: category.to_string(),
        })
    }

    /// Validates raw command line input.
    pub fn parse(
        r#type: &str,
        amount: &str,
        description: &str,
        date: &str,
        category: &str,
    ) -> Result<Self, ValidationError> {
        Self::new(
            r#type.parse()?,
            parse_amount(amount)?,
            description,
            parse_date(date)?,
            category,
        )
    }

    pub(crate) fn into_transaction(self, id: u32) -> Transaction {
        Transaction {
            id,
            r#type: self.r#type,
            amount: self.amount,
            description: self.description,
            date: self.date,
            category: self.category,
        }
    }
}

pub fn parse_amount(input: &str) -> Result<Amount, ValidationError> {
    input
        .parse()
        .map_err(|source| ValidationError::InvalidAmount {
            input: input.to_string(),
            source,
        })
}

/// Picks the format from the field widths. chrono's `%Y` takes any number
/// of digits, so the four digit year has to be checked here.
fn date_format(input: &str) -> Option<&'static str> {
    let fields: Vec<&str> = input.split('-').collect();
    let (first, middle, last) = match fields.as_slice() {
        [first, middle, last] => (*first, *middle, *last),
        _ => return None,
    };
    let all_digits = fields
        .iter()
        .all(|field| !field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()));
    if !all_digits || middle.len() > 2 {
        return None;
    }
    match (first.len(), last.len()) {
        (4, 1..=2) => Some(ISO_DATE),
        (1..=2, 4) => Some(DAY_FIRST_DATE),
        _ => None,
    }
}

/// Accepts `YYYY-MM-DD` or `DD-MM-YYYY`, nothing else.
pub fn parse_date(input: &str) -> Result<NaiveDate, ValidationError> {
    let trimmed = input.trim();
    date_format(trimmed)
        .and_then(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| ValidationError::InvalidDate(input.to_string()))
}

/// A row as it appears in the ledger file, before validation.
#[derive(Debug, Deserialize)]
pub(crate) struct StoredTransaction {
    id: u32,
    r#type: TransactionType,
    amount: Amount,
    description: String,
    date: String,
    #[serde(default = "default_category")]
    category: String,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl TryFrom<StoredTransaction> for Transaction {
    type Error = ValidationError;

    fn try_from(stored: StoredTransaction) -> Result<Self, Self::Error> {
        let date = parse_date(&stored.date)?;
        let new = NewTransaction::new(
            stored.r#type,
            stored.amount,
            &stored.description,
            date,
            &stored.category,
        )?;
        Ok(new.into_transaction(stored.id))
    }
}
