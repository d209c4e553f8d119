mod config;
mod error;
mod fixedpoint;
mod goals;
mod ledger;
mod report;
mod storage;
mod transactions;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{debug, warn};

use crate::{
    config::{Config, DEFAULT_LEDGER_PATH, LEDGER_PATH_ENV},
    error::{LedgerError, ValidationError},
    ledger::{Filter, Ledger},
    transactions::{parse_amount, parse_date, NewTransaction, TransactionType, DEFAULT_CATEGORY},
};

#[derive(Parser, Debug)]
#[clap(name = "finance", version, about = "Personal income and expense ledger")]
struct Args {
    /// Ledger file to read and write
    #[clap(long, global = true, env = LEDGER_PATH_ENV, default_value = DEFAULT_LEDGER_PATH)]
    file: PathBuf,

    /// More diagnostics on stderr (-v, -vv, -vvv)
    #[clap(short, long, global = true, parse(from_occurrences))]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record an income or expense
    Add {
        /// income or expense
        #[clap(value_name = "TYPE")]
        kind: String,
        /// Positive amount, up to 4 decimal places
        #[clap(allow_hyphen_values = true)]
        amount: String,
        description: String,
        /// YYYY-MM-DD or DD-MM-YYYY
        date: String,
        #[clap(long, default_value = DEFAULT_CATEGORY)]
        category: String,
    },
    /// List transactions, optionally filtered
    List {
        #[clap(long)]
        category: Option<String>,
        #[clap(long = "type", value_name = "TYPE")]
        kind: Option<String>,
        #[clap(long)]
        from: Option<String>,
        #[clap(long)]
        to: Option<String>,
        /// Order by transaction date instead of entry order
        #[clap(long)]
        by_date: bool,
    },
    /// Show income, expense and balance totals
    Balance,
    /// Write all transactions and the balance to a CSV file
    Export { path: PathBuf },
    /// Per-category summary of one month
    Report { year: i32, month: u32 },
    /// Category spending limits
    Budget {
        #[clap(subcommand)]
        command: BudgetCommand,
    },
    /// Savings goals
    Goal {
        #[clap(subcommand)]
        command: GoalCommand,
    },
    /// Swap the ledger and its budgets and goals with the copies kept by the last save
    Restore,
}

#[derive(Subcommand, Debug)]
enum BudgetCommand {
    /// Set or replace the budget of a category
    Set { category: String, amount: String },
    /// Show every budget and how much of it is spent
    List,
}

#[derive(Subcommand, Debug)]
enum GoalCommand {
    /// Create a goal, or change the target and deadline of an existing one
    Set {
        name: String,
        target: String,
        /// YYYY-MM-DD or DD-MM-YYYY, today or later
        deadline: String,
    },
    /// Put money towards a goal
    Add { name: String, amount: String },
    /// Show progress towards every goal
    List,
}

/// A malformed ledger or budgets file is moved aside and replaced by an
/// empty one; the user is told where the old content went.
fn open_ledger(path: &Path) -> Result<Ledger, LedgerError> {
    let mut quarantined = 0;
    loop {
        match storage::load_or_default(path) {
            Err(LedgerError::Format {
                path: corrupt,
                line,
                message,
            }) if quarantined < 2 => {
                let moved = storage::quarantine(&corrupt)?;
                warn!(file = %corrupt.display(), ?line, %message, "starting from an empty file");
                eprintln!(
                    "Warning: {} is malformed ({}); moved it to {} and started fresh",
                    corrupt.display(),
                    message,
                    moved.display()
                );
                quarantined += 1;
            }
            result => return result,
        }
    }
}

fn run(command: Command, config: &Config) -> Result<(), LedgerError> {
    run_on(command, config, Local::now().date_naive())
}

fn run_on(command: Command, config: &Config, today: NaiveDate) -> Result<(), LedgerError> {
    let path = config.ledger_path.as_path();
    let mut ledger = open_ledger(path)?;

    match command {
        Command::Add {
            kind,
            amount,
            description,
            date,
            category,
        } => {
            let new = NewTransaction::parse(&kind, &amount, &description, &date, &category)?;
            let added = ledger.add(new)?.clone();
            storage::save(&ledger, path)?;
            println!(
                "Recorded #{}: {} {} \"{}\" on {} ({})",
                added.id, added.r#type, added.amount, added.description, added.date, added.category
            );
        }
        Command::List {
            category,
            kind,
            from,
            to,
            by_date,
        } => {
            let filter = Filter {
                category,
                r#type: kind
                    .as_deref()
                    .map(str::parse::<TransactionType>)
                    .transpose()?,
                from: from.as_deref().map(parse_date).transpose()?,
                to: to.as_deref().map(parse_date).transpose()?,
            };
            if filter.is_empty() && !by_date {
                print!("{}", report::render(&ledger));
            } else {
                let mut transactions = ledger.filter(&filter)?;
                // Stable, so same-day entries keep their entry order.
                if by_date {
                    transactions.sort_by_key(|transaction| transaction.date);
                }
                print!("{}", report::render_transactions(&transactions));
            }
        }
        Command::Balance => {
            print!("{}", ledger.summary());
            for status in ledger.exceeded_budgets() {
                println!(
                    "Warning: budget for {} exceeded by {} ({} spent of {})",
                    status.category, -status.remaining, status.spent, status.limit
                );
            }
        }
        Command::Export { path: export_path } => {
            if storage::is_ledger_file(path, &export_path) {
                return Err(ValidationError::ReservedPath(export_path).into());
            }
            report::export_csv(&ledger, &export_path)?;
            println!(
                "Exported {} transactions to {}",
                ledger.list().len(),
                export_path.display()
            );
        }
        Command::Report { year, month } => {
            print!("{}", ledger.monthly_report(year, month)?);
        }
        Command::Budget {
            command: BudgetCommand::Set { category, amount },
        } => {
            let limit = parse_amount(&amount)?;
            ledger.set_budget(&category, limit)?;
            storage::save(&ledger, path)?;
            println!("Budget for {} set to {}", category.trim(), limit);
        }
        Command::Budget {
            command: BudgetCommand::List,
        } => {
            print!("{}", report::render_budgets(&ledger.budget_status()));
        }
        Command::Goal {
            command:
                GoalCommand::Set {
                    name,
                    target,
                    deadline,
                },
        } => {
            let target = parse_amount(&target)?;
            let deadline = parse_date(&deadline)?;
            let goal = ledger.set_goal(&name, target, deadline, today)?.clone();
            storage::save(&ledger, path)?;
            println!(
                "Goal {} set to {} by {} ({} saved so far)",
                goal.name, goal.target, goal.deadline, goal.saved
            );
        }
        Command::Goal {
            command: GoalCommand::Add { name, amount },
        } => {
            let amount = parse_amount(&amount)?;
            let goal = ledger.contribute_to_goal(&name, amount)?.clone();
            storage::save(&ledger, path)?;
            println!("Saved {} of {} for {}", goal.saved, goal.target, goal.name);
        }
        Command::Goal {
            command: GoalCommand::List,
        } => {
            print!("{}", report::render_goals(ledger.goals(), today));
        }
        Command::Restore => {
            let restored = storage::restore_backup(path)?;
            println!(
                "Restored {} transactions from {}; the replaced files are now the backup",
                restored.list().len(),
                storage::backup_path(path).display()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = Config::new(args.file, args.verbose);
    config.init_logging();
    debug!(?config, "starting");

    match run(args.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            debug!(?error, "command failed");
            eprintln!("Error: {}", error);
            ExitCode::from(error.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn invoke(path: &Path, args: &[&str]) -> Result<(), LedgerError> {
        let mut argv = vec!["finance", "--file", path.to_str().unwrap()];
        argv.extend_from_slice(args);
        let args = Args::try_parse_from(argv).unwrap();
        run_on(args.command, &Config::new(args.file, args.verbose), today())
    }

    mod arguments {
        use super::*;

        #[test]
        fn add_with_category() {
            let args = Args::try_parse_from([
                "finance", "add", "expense", "12.50", "Lunch", "2024-01-02", "--category", "food",
            ])
            .unwrap();
            match args.command {
                Command::Add { kind, amount, category, .. } => {
                    assert_eq!(kind, "expense");
                    assert_eq!(amount, "12.50");
                    assert_eq!(category, "food");
                }
                other => panic!("unexpected command {:?}", other),
            }
        }

        #[test]
        fn negative_amount_reaches_validation() {
            let args =
                Args::try_parse_from(["finance", "add", "expense", "-5", "Oops", "2024-01-02"])
                    .unwrap();
            assert!(matches!(args.command, Command::Add { ref amount, .. } if amount == "-5"));
        }

        #[test]
        fn file_flag_after_subcommand() {
            let args = Args::try_parse_from(["finance", "balance", "--file", "other.csv"]).unwrap();
            assert_eq!(args.file, PathBuf::from("other.csv"));

            let args = Args::try_parse_from(["finance", "-vv", "balance"]).unwrap();
            assert_eq!(args.verbose, 2);
        }

        #[test]
        fn missing_arguments_rejected() {
            assert!(Args::try_parse_from(["finance", "add", "income"]).is_err());
            assert!(Args::try_parse_from(["finance"]).is_err());
        }
    }

    mod commands {
        use super::*;

        #[test]
        fn add_persists_and_balance_reads_back() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");

            invoke(&path, &["add", "income", "100", "Salary", "2024-01-05"]).unwrap();
            invoke(&path, &["add", "expense", "40", "Rent", "05-01-2024", "--category", "housing"])
                .unwrap();
            invoke(&path, &["balance"]).unwrap();

            let ledger = storage::load(&path).unwrap();
            assert_eq!(ledger.list().len(), 2);
            assert_eq!(ledger.balance(), parse_amount("60").unwrap());
            assert_eq!(ledger.list()[1].category, "housing");
        }

        #[test]
        fn invalid_add_fails_without_writing() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");

            let err = invoke(&path, &["add", "expense", "-5", "Oops", "2024-01-02"]).unwrap_err();
            assert!(matches!(
                err,
                LedgerError::Validation(ValidationError::NonPositiveAmount(_))
            ));
            assert_eq!(err.exit_code(), 2);
            assert!(!path.exists());

            let err = invoke(&path, &["add", "gift", "5", "Oops", "2024-01-02"]).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(ValidationError::UnknownType(_))));
        }

        #[test]
        fn list_with_filters() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");
            invoke(&path, &["add", "income", "100", "Salary", "2024-01-05"]).unwrap();

            invoke(&path, &["list"]).unwrap();
            invoke(&path, &["list", "--type", "income", "--by-date"]).unwrap();
            let err = invoke(&path, &["list", "--from", "2024-02-01", "--to", "2024-01-01"])
                .unwrap_err();
            assert!(matches!(
                err,
                LedgerError::Validation(ValidationError::InvalidRange { .. })
            ));
        }

        #[test]
        fn export_writes_balance_row() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");
            let export = dir.path().join("out.csv");
            invoke(&path, &["add", "income", "100", "Salary", "2024-01-05"]).unwrap();

            invoke(&path, &["export", export.to_str().unwrap()]).unwrap();

            let content = fs::read_to_string(&export).unwrap();
            assert_eq!(content.lines().count(), 3);
            assert!(content.ends_with(",balance,100.00,,,\n"));
        }

        #[test]
        fn budgets_and_report() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");
            invoke(&path, &["budget", "set", "food", "50"]).unwrap();
            invoke(&path, &["add", "expense", "60", "Groceries", "2024-03-03", "--category", "Food"])
                .unwrap();

            let ledger = storage::load(&path).unwrap();
            assert_eq!(ledger.exceeded_budgets().len(), 1);
            invoke(&path, &["budget", "list"]).unwrap();
            invoke(&path, &["report", "2024", "3"]).unwrap();

            let err = invoke(&path, &["report", "2024", "13"]).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(ValidationError::InvalidMonth(13))));
        }

        #[test]
        fn corrupt_file_is_quarantined_not_lost() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");
            fs::write(&path, "id,type,amount\n1,income,abc\n").unwrap();

            invoke(&path, &["add", "income", "1", "Fresh start", "2024-01-01"]).unwrap();

            let kept = fs::read_to_string(dir.path().join("ledger.csv.corrupt")).unwrap();
            assert_eq!(kept, "id,type,amount\n1,income,abc\n");
            let ledger = storage::load(&path).unwrap();
            assert_eq!(ledger.list().len(), 1);
            assert_eq!(ledger.list()[0].id, 1);
        }

        #[test]
        fn repeated_corruption_keeps_every_copy() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");

            fs::write(&path, "id,type,amount\n1,income,FIRST\n").unwrap();
            open_ledger(&path).unwrap();
            fs::write(&path, "id,type,amount\n1,income,SECOND\n").unwrap();
            open_ledger(&path).unwrap();

            let first = fs::read_to_string(dir.path().join("ledger.csv.corrupt")).unwrap();
            let second = fs::read_to_string(dir.path().join("ledger.csv.corrupt.1")).unwrap();
            assert!(first.contains("FIRST"));
            assert!(second.contains("SECOND"));
        }

        #[test]
        fn goals_are_set_funded_and_listed() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");

            invoke(&path, &["goal", "set", "Holiday", "1000", "01-12-2024"]).unwrap();
            invoke(&path, &["goal", "add", "holiday", "250"]).unwrap();
            invoke(&path, &["goal", "list"]).unwrap();

            let ledger = storage::load(&path).unwrap();
            let goal = ledger.goal("Holiday").unwrap();
            assert_eq!(goal.saved, parse_amount("250").unwrap());
            assert_eq!(goal.deadline, parse_date("2024-12-01").unwrap());
            assert!(storage::goals_path(&path).exists());

            let err = invoke(&path, &["goal", "set", "Car", "5000", "2024-05-31"]).unwrap_err();
            assert!(matches!(
                err,
                LedgerError::Validation(ValidationError::DeadlinePassed { .. })
            ));
            let err = invoke(&path, &["goal", "add", "Car", "5"]).unwrap_err();
            assert!(matches!(err, LedgerError::Validation(ValidationError::UnknownGoal(_))));
        }

        #[test]
        fn restore_undoes_the_last_save() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");

            let err = invoke(&path, &["restore"]).unwrap_err();
            assert!(matches!(err, LedgerError::NotFound(_)));
            assert_eq!(err.exit_code(), 3);

            invoke(&path, &["add", "income", "100", "Salary", "2024-01-05"]).unwrap();
            invoke(&path, &["budget", "set", "food", "50"]).unwrap();
            invoke(&path, &["add", "expense", "30", "Typo", "2024-01-06"]).unwrap();

            invoke(&path, &["restore"]).unwrap();
            let ledger = storage::load(&path).unwrap();
            assert_eq!(ledger.list().len(), 1);
            assert_eq!(ledger.budget_for("food"), Some(parse_amount("50").unwrap()));
        }

        #[test]
        fn export_refuses_to_overwrite_ledger_files() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("ledger.csv");
            invoke(&path, &["add", "income", "100", "Salary", "2024-01-05"]).unwrap();
            invoke(&path, &["budget", "set", "food", "50"]).unwrap();
            let before = fs::read_to_string(&path).unwrap();

            for target in [path.clone(), storage::budgets_path(&path)] {
                let err = invoke(&path, &["export", target.to_str().unwrap()]).unwrap_err();
                assert!(matches!(
                    err,
                    LedgerError::Validation(ValidationError::ReservedPath(_))
                ));
            }
            assert_eq!(fs::read_to_string(&path).unwrap(), before);
            assert_eq!(storage::load(&path).unwrap().list().len(), 1);
        }
    }
}
