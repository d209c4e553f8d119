use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::{
    error::ValidationError,
    fixedpoint::Amount,
    goals::Goal,
    transactions::{NewTransaction, Transaction, TransactionType},
};

/**
 * Owns every transaction of a session in entry order, plus the
 * per-category budgets and the savings goals. There is no global instance: callers load one,
 * pass it around, and save it back.
 */
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    budgets: BTreeMap<String, Amount>,
    goals: BTreeMap<String, Goal>,
    last_id: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub income: Amount,
    pub expense: Amount,
    pub balance: Amount,
}

impl Totals {
    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Self {
        let mut totals = Totals::default();
        for transaction in transactions {
            match transaction.r#type {
                TransactionType::Income => {
                    totals.income = totals.income.saturating_add(transaction.amount)
                }
                TransactionType::Expense => {
                    totals.expense = totals.expense.saturating_add(transaction.amount)
                }
            }
            totals.balance = totals.balance.saturating_add(transaction.signed_amount());
        }
        totals
    }
}

/// Every criterion is optional; an empty filter matches everything.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Filter {
    pub category: Option<String>,
    pub r#type: Option<TransactionType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Filter {
    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(ValidationError::InvalidRange { from, to }),
            _ => Ok(()),
        }
    }

    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.category
            .as_deref()
            .map_or(true, |category| same_category(category, &transaction.category))
            && self.r#type.map_or(true, |kind| kind == transaction.r#type)
            && self.from.map_or(true, |from| transaction.date >= from)
            && self.to.map_or(true, |to| transaction.date <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetStatus {
    pub category: String,
    pub limit: Amount,
    pub spent: Amount,
    /// Negative once the budget is exceeded.
    pub remaining: Amount,
}

impl BudgetStatus {
    pub fn is_exceeded(&self) -> bool {
        self.spent > self.limit
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryBreakdown {
    pub category: String,
    pub income: Amount,
    pub expense: Amount,
    pub budget: Option<Amount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyReport {
    pub year: i32,
    pub month: u32,
    pub totals: Totals,
    pub categories: Vec<CategoryBreakdown>,
}

fn same_category(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

impl Ledger {
    /// Rebuilds a ledger from a persisted snapshot. Ids are assumed unique.
    pub fn restore(
        transactions: Vec<Transaction>,
        budgets: BTreeMap<String, Amount>,
        goals: impl IntoIterator<Item = Goal>,
    ) -> Self {
        let last_id = transactions.iter().map(|t| t.id).max().unwrap_or(0);
        Ledger {
            transactions,
            budgets,
            goals: goals
                .into_iter()
                .map(|goal| (goal.name.clone(), goal))
                .collect(),
            last_id,
        }
    }

    pub fn add(&mut self, new: NewTransaction) -> Result<&Transaction, ValidationError> {
        let id = self
            .last_id
            .checked_add(1)
            .ok_or(ValidationError::IdsExhausted)?;
        let transaction = new.into_transaction(id);
        debug!(
            id,
            kind = %transaction.r#type,
            amount = %transaction.amount,
            "recorded transaction"
        );

        self.last_id = id;
        self.transactions.push(transaction);
        Ok(&self.transactions[self.transactions.len() - 1])
    }

    pub fn list(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn balance(&self) -> Amount {
        self.summary().balance
    }

    pub fn summary(&self) -> Totals {
        Totals::from_transactions(&self.transactions)
    }

    pub fn filter(&self, filter: &Filter) -> Result<Vec<&Transaction>, ValidationError> {
        filter.validate()?;
        Ok(self
            .transactions
            .iter()
            .filter(|transaction| filter.matches(transaction))
            .collect())
    }

    pub fn monthly_report(&self, year: i32, month: u32) -> Result<MonthlyReport, ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth(month));
        }

        let in_month: Vec<&Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.date.year() == year && t.date.month() == month)
            .collect();

        // Keyed by lowercase name so "Food" and "food" land together;
        // the first spelling seen is the one shown.
        let mut by_category: BTreeMap<String, (String, Vec<&Transaction>)> = BTreeMap::new();
        for &transaction in &in_month {
            by_category
                .entry(transaction.category.to_lowercase())
                .or_insert_with(|| (transaction.category.clone(), Vec::new()))
                .1
                .push(transaction);
        }

        let categories = by_category
            .into_values()
            .map(|(category, transactions)| {
                let totals = Totals::from_transactions(transactions);
                CategoryBreakdown {
                    budget: self.budget_for(&category),
                    category,
                    income: totals.income,
                    expense: totals.expense,
                }
            })
            .collect();

        Ok(MonthlyReport {
            year,
            month,
            totals: Totals::from_transactions(in_month),
            categories,
        })
    }

    /// Replaces any budget already set for the category, whatever its case.
    pub fn set_budget(&mut self, category: &str, limit: Amount) -> Result<(), ValidationError> {
        if !limit.is_positive() {
            return Err(ValidationError::NonPositiveAmount(limit));
        }
        let category = category.trim();
        if category.is_empty() {
            return Err(ValidationError::EmptyCategory);
        }

        self.budgets
            .retain(|existing, _| !same_category(existing, category));
        self.budgets.insert(category.to_string(), limit);
        debug!(category, limit = %limit, "budget set");
        Ok(())
    }

    pub fn budgets(&self) -> &BTreeMap<String, Amount> {
        &self.budgets
    }

    pub fn budget_for(&self, category: &str) -> Option<Amount> {
        self.budgets
            .iter()
            .find(|(existing, _)| same_category(existing, category))
            .map(|(_, limit)| *limit)
    }

    pub fn budget_status(&self) -> Vec<BudgetStatus> {
        self.budgets
            .iter()
            .map(|(category, limit)| {
                let spent = self
                    .transactions
                    .iter()
                    .filter(|t| {
                        t.r#type == TransactionType::Expense
                            && same_category(&t.category, category)
                    })
                    .fold(Amount::ZERO, |sum, t| sum.saturating_add(t.amount));
                BudgetStatus {
                    category: category.clone(),
                    limit: *limit,
                    spent,
                    remaining: limit.saturating_sub(spent),
                }
            })
            .collect()
    }

    pub fn exceeded_budgets(&self) -> Vec<BudgetStatus> {
        self.budget_status()
            .into_iter()
            .filter(BudgetStatus::is_exceeded)
            .collect()
    }

    /**
     * Creates a goal, or changes the target and deadline of the goal with
     * the same name (any case). Money already saved towards it is kept.
     */
    pub fn set_goal(
        &mut self,
        name: &str,
        target: Amount,
        deadline: NaiveDate,
        today: NaiveDate,
    ) -> Result<&Goal, ValidationError> {
        let mut goal = Goal::new(name, target, deadline, today)?;
        if let Some(key) = self.goal_key(&goal.name) {
            if let Some(previous) = self.goals.remove(&key) {
                goal.saved = previous.saved;
            }
        }
        debug!(name = %goal.name, target = %goal.target, %deadline, "goal set");

        let key = goal.name.clone();
        Ok(&*self.goals.entry(key).or_insert(goal))
    }

    pub fn contribute_to_goal(&mut self, name: &str, amount: Amount) -> Result<&Goal, ValidationError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        let key = self
            .goal_key(name)
            .ok_or_else(|| ValidationError::UnknownGoal(name.trim().to_string()))?;
        let goal = self
            .goals
            .get_mut(&key)
            .ok_or_else(|| ValidationError::UnknownGoal(key.clone()))?;

        goal.saved = goal.saved.saturating_add(amount);
        debug!(name = %goal.name, %amount, saved = %goal.saved, "goal contribution");
        Ok(&*goal)
    }

    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.values()
    }

    pub fn goal(&self, name: &str) -> Option<&Goal> {
        self.goal_key(name).and_then(|key| self.goals.get(&key))
    }

    fn goal_key(&self, name: &str) -> Option<String> {
        self.goals
            .keys()
            .find(|existing| same_category(existing, name))
            .cloned()
    }
}
