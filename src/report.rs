use std::{
    fmt::{self, Display},
    path::Path,
};

use chrono::NaiveDate;

use tracing::info;

use crate::{
    error::LedgerError,
    goals::Goal,
    ledger::{BudgetStatus, Ledger, MonthlyReport, Totals},
    storage::{write_csv, LEDGER_HEADERS},
    transactions::Transaction,
};

const DESCRIPTION_WIDTH: usize = 25;
const RULE_WIDTH: usize = 86;
const PROGRESS_BAR_WIDTH: usize = 20;

fn truncate(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_WIDTH {
        let kept: String = description.chars().take(DESCRIPTION_WIDTH - 3).collect();
        format!("{}...", kept)
    } else {
        description.to_string()
    }
}

fn write_table<'a>(
    f: &mut fmt::Formatter<'_>,
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> fmt::Result {
    let mut transactions = transactions.into_iter().peekable();
    if transactions.peek().is_none() {
        return writeln!(f, "No transactions recorded.");
    }

    writeln!(
        f,
        "{:<6} | {:<10} | {:<25} | {:>12} | {:<7} | {}",
        "ID", "Date", "Description", "Amount", "Type", "Category"
    )?;
    writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
    for transaction in transactions {
        writeln!(
            f,
            "{:<6} | {:<10} | {:<25} | {:>12} | {:<7} | {}",
            transaction.id,
            transaction.date.to_string(),
            truncate(&transaction.description),
            transaction.amount.to_string(),
            transaction.r#type,
            transaction.category
        )?;
    }
    Ok(())
}

/// Full listing followed by the balance summary.
impl Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_table(f, self.list())?;
        writeln!(f)?;
        write!(f, "{}", self.summary())
    }
}

impl Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Income:  {:>12}", self.income.to_string())?;
        writeln!(f, "Expense: {:>12}", self.expense.to_string())?;
        writeln!(f, "Balance: {:>12}", self.balance.to_string())
    }
}

impl Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} | {:>12} | {:>12} | {:>12} | {}",
            self.category,
            self.limit.to_string(),
            self.spent.to_string(),
            self.remaining.to_string(),
            if self.is_exceeded() { "exceeded" } else { "within" }
        )
    }
}

impl Display for MonthlyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Monthly report {:02}/{}", self.month, self.year)?;
        writeln!(f, "{}", "-".repeat(40))?;
        if self.categories.is_empty() {
            return writeln!(f, "No transactions in {:02}/{}.", self.month, self.year);
        }
        write!(f, "{}", self.totals)?;
        writeln!(f, "{}", "-".repeat(40))?;

        for category in &self.categories {
            writeln!(f)?;
            writeln!(f, "{}", category.category.to_uppercase())?;
            if category.income.is_positive() {
                writeln!(f, "  Income:  {}", category.income)?;
            }
            if category.expense.is_positive() {
                writeln!(f, "  Expense: {}", category.expense)?;
            }
            if let Some(budget) = category.budget {
                let left = budget.saturating_sub(category.expense);
                if category.expense > budget {
                    writeln!(f, "  Budget exceeded by {}", -left)?;
                } else {
                    writeln!(f, "  Budget remaining: {}", left)?;
                }
            }
        }
        Ok(())
    }
}

pub fn render(ledger: &Ledger) -> String {
    ledger.to_string()
}

struct Listing<'a>(&'a [&'a Transaction]);

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_table(f, self.0.iter().copied())?;
        if !self.0.is_empty() {
            writeln!(f)?;
            write!(f, "{}", Totals::from_transactions(self.0.iter().copied()))?;
        }
        Ok(())
    }
}

/// A subset of the ledger, with totals for just that subset.
pub fn render_transactions(transactions: &[&Transaction]) -> String {
    Listing(transactions).to_string()
}

pub fn render_budgets(statuses: &[BudgetStatus]) -> String {
    if statuses.is_empty() {
        return "No budgets set.\n".to_string();
    }
    let mut out = format!(
        "{:<20} | {:>12} | {:>12} | {:>12} | {}\n",
        "Category", "Budget", "Spent", "Remaining", "Status"
    );
    out.push_str(&"-".repeat(76));
    out.push('\n');
    for status in statuses {
        out.push_str(&status.to_string());
        out.push('\n');
    }
    out
}

struct GoalProgress<'a> {
    goal: &'a Goal,
    today: NaiveDate,
}

impl Display for GoalProgress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let goal = self.goal;
        let per_mille = goal.progress_per_mille().max(0);
        let filled = usize::try_from(per_mille / 50)
            .unwrap_or(PROGRESS_BAR_WIDTH)
            .min(PROGRESS_BAR_WIDTH);

        writeln!(f, "{}", goal.name)?;
        writeln!(
            f,
            "  [{}{}] {}.{}%",
            "#".repeat(filled),
            " ".repeat(PROGRESS_BAR_WIDTH - filled),
            per_mille / 10,
            per_mille % 10
        )?;
        if goal.is_reached() {
            writeln!(f, "  Saved {} of {}, goal reached", goal.saved, goal.target)?;
        } else {
            writeln!(
                f,
                "  Saved {} of {}, {} to go",
                goal.saved,
                goal.target,
                goal.remaining()
            )?;
        }
        match goal.days_left(self.today) {
            0 => writeln!(f, "  Deadline {}, due today", goal.deadline),
            1 => writeln!(f, "  Deadline {}, 1 day left", goal.deadline),
            days if days > 0 => writeln!(f, "  Deadline {}, {} days left", goal.deadline, days),
            days => writeln!(f, "  Deadline {}, {} days overdue", goal.deadline, -days),
        }
    }
}

/// Progress of every goal as of `today`.
pub fn render_goals<'a>(goals: impl IntoIterator<Item = &'a Goal>, today: NaiveDate) -> String {
    let blocks: Vec<String> = goals
        .into_iter()
        .map(|goal| GoalProgress { goal, today }.to_string())
        .collect();
    if blocks.is_empty() {
        return "No goals set.\n".to_string();
    }
    blocks.join("\n")
}

/**
 * One row per transaction, then a `balance` row carrying the signed
 * balance in the amount column. Reading it back with a header-aware CSV
 * reader yields `list().len() + 1` records.
 */
pub fn export_csv(ledger: &Ledger, path: &Path) -> Result<(), LedgerError> {
    let balance = ledger.balance().to_string();
    write_csv(path, &LEDGER_HEADERS, |writer| {
        for transaction in ledger.list() {
            writer.serialize(transaction)?;
        }
        writer.write_record(["", "balance", balance.as_str(), "", "", ""])
    })?;

    info!(
        path = %path.display(),
        transactions = ledger.list().len(),
        "ledger exported"
    );
    Ok(())
}
