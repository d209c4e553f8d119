use std::{
    collections::{BTreeMap, HashSet},
    ffi::OsString,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    error::LedgerError,
    fixedpoint::Amount,
    goals::Goal,
    ledger::Ledger,
    transactions::{StoredTransaction, Transaction},
};

pub const LEDGER_HEADERS: [&str; 6] = ["id", "type", "amount", "description", "date", "category"];
const BUDGET_HEADERS: [&str; 2] = ["category", "amount"];
const GOAL_HEADERS: [&str; 4] = ["name", "target", "saved", "deadline"];

#[derive(Debug, Serialize, Deserialize)]
struct BudgetRow {
    category: String,
    amount: Amount,
}

/// `ledger.csv` keeps its budgets in `ledger.budgets.csv`.
pub fn budgets_path(path: &Path) -> PathBuf {
    path.with_extension("budgets.csv")
}

pub fn goals_path(path: &Path) -> PathBuf {
    path.with_extension("goals.csv")
}

/// Every file a snapshot is made of, ledger first.
fn snapshot_paths(path: &Path) -> [PathBuf; 3] {
    [path.to_path_buf(), budgets_path(path), goals_path(path)]
}

pub fn backup_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// `<path>.corrupt`, or `<path>.corrupt.N` for the first N not taken yet.
pub fn quarantine_path(path: &Path) -> PathBuf {
    let mut candidate = with_suffix(path, ".corrupt");
    let mut n: u32 = 1;
    while fs::symlink_metadata(&candidate).is_ok() {
        candidate = with_suffix(path, &format!(".corrupt.{}", n));
        n = n.saturating_add(1);
    }
    candidate
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// True when `candidate` is one of the files `save` manages for the
/// ledger at `path`, backups included.
pub fn is_ledger_file(path: &Path, candidate: &Path) -> bool {
    let candidate = resolve(candidate);
    snapshot_paths(path)
        .iter()
        .flat_map(|file| [file.clone(), backup_path(file)])
        .any(|file| resolve(&file) == candidate)
}

/// Absolute form of a path whose file may not exist yet.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/**
 * Overwrites the ledger and its sidecar files with a full snapshot.
 *
 * Every file is first written to a temporary sibling. Only when all of
 * them are written are the current files copied to `.bak` and the new
 * ones renamed into place. A rename that fails puts the already replaced
 * files back from their backups, so a failed save leaves the previous
 * snapshot on disk.
 */
pub fn save(ledger: &Ledger, path: &Path) -> Result<(), LedgerError> {
    let mut staged = Vec::new();
    let result = stage_snapshot(ledger, path, &mut staged)
        .and_then(|()| back_up(path))
        .and_then(|()| commit(&staged));
    for (temp, _) in &staged {
        discard(temp);
    }
    result?;

    info!(
        path = %path.display(),
        transactions = ledger.list().len(),
        "ledger saved"
    );
    Ok(())
}

/// A sidecar is written when it has content or already exists, so an
/// emptied one is truncated rather than left stale.
fn stage_snapshot(
    ledger: &Ledger,
    path: &Path,
    staged: &mut Vec<(PathBuf, PathBuf)>,
) -> Result<(), LedgerError> {
    let temp = write_temp(path, &LEDGER_HEADERS, |writer| {
        for transaction in ledger.list() {
            writer.serialize(transaction)?;
        }
        Ok(())
    })?;
    staged.push((temp, path.to_path_buf()));

    let budgets = budgets_path(path);
    if !ledger.budgets().is_empty() || budgets.exists() {
        let temp = write_temp(&budgets, &BUDGET_HEADERS, |writer| {
            for (category, amount) in ledger.budgets() {
                writer.serialize(BudgetRow {
                    category: category.clone(),
                    amount: *amount,
                })?;
            }
            Ok(())
        })?;
        staged.push((temp, budgets));
    }

    let goals = goals_path(path);
    if ledger.goals().next().is_some() || goals.exists() {
        let temp = write_temp(&goals, &GOAL_HEADERS, |writer| {
            for goal in ledger.goals() {
                writer.serialize(goal)?;
            }
            Ok(())
        })?;
        staged.push((temp, goals));
    }
    Ok(())
}

/// Copies the current snapshot to `.bak`. A file that does not exist has
/// its old backup removed, so the backups always form one snapshot.
fn back_up(path: &Path) -> Result<(), LedgerError> {
    for file in snapshot_paths(path) {
        let backup = backup_path(&file);
        if file.exists() {
            fs::copy(&file, &backup).map_err(|source| LedgerError::io(&backup, source))?;
            debug!(backup = %backup.display(), "backed up");
        } else if let Err(source) = fs::remove_file(&backup) {
            if source.kind() != io::ErrorKind::NotFound {
                return Err(LedgerError::io(&backup, source));
            }
        }
    }
    Ok(())
}

fn commit(staged: &[(PathBuf, PathBuf)]) -> Result<(), LedgerError> {
    for (done, (temp, target)) in staged.iter().enumerate() {
        if let Err(source) = fs::rename(temp, target) {
            for (_, replaced) in &staged[..done] {
                roll_back(replaced);
            }
            return Err(LedgerError::io(target, source));
        }
    }
    Ok(())
}

fn roll_back(path: &Path) {
    let backup = backup_path(path);
    let result = if backup.exists() {
        fs::copy(&backup, path).map(drop)
    } else {
        fs::remove_file(path)
    };
    if let Err(err) = result {
        warn!(path = %path.display(), error = %err, "could not roll back");
    }
}

fn discard(temp_path: &Path) {
    if let Err(err) = fs::remove_file(temp_path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %temp_path.display(), error = %err, "could not remove temporary file");
        }
    }
}

/// Writes headers and rows to a temporary sibling of `path` and returns it.
fn write_temp<F>(path: &Path, headers: &[&str], write_rows: F) -> Result<PathBuf, LedgerError>
where
    F: FnOnce(&mut csv::Writer<File>) -> csv::Result<()>,
{
    let temp_path = with_suffix(path, ".tmp");
    let write = || -> io::Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&temp_path)?;
        writer.write_record(headers)?;
        write_rows(&mut writer)?;
        writer.flush()?;
        Ok(())
    };

    if let Err(source) = write() {
        discard(&temp_path);
        return Err(LedgerError::io(path, source));
    }
    Ok(temp_path)
}

/// Writes headers and rows to a temporary sibling, then renames it over `path`.
pub(crate) fn write_csv<F>(path: &Path, headers: &[&str], write_rows: F) -> Result<(), LedgerError>
where
    F: FnOnce(&mut csv::Writer<File>) -> csv::Result<()>,
{
    let temp_path = write_temp(path, headers, write_rows)?;
    fs::rename(&temp_path, path).map_err(|source| {
        discard(&temp_path);
        LedgerError::io(path, source)
    })
}

/**
 * Reads a full ledger snapshot. A missing file is `NotFound`; callers
 * that treat a first run as an empty ledger use `load_or_default`.
 */
pub fn load(path: &Path) -> Result<Ledger, LedgerError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => LedgerError::NotFound(path.to_path_buf()),
        _ => LedgerError::io(path, source),
    })?;
    let transactions = read_transactions(path, file)?;
    let budgets = load_budgets(&budgets_path(path))?;
    let goals = load_goals(&goals_path(path))?;

    info!(
        path = %path.display(),
        transactions = transactions.len(),
        budgets = budgets.len(),
        goals = goals.len(),
        "ledger loaded"
    );
    Ok(Ledger::restore(transactions, budgets, goals))
}

/// First run policy: no ledger file means an empty ledger.
pub fn load_or_default(path: &Path) -> Result<Ledger, LedgerError> {
    match load(path) {
        Err(LedgerError::NotFound(_)) => {
            info!(path = %path.display(), "no ledger file yet, starting empty");
            let budgets = load_budgets(&budgets_path(path))?;
            let goals = load_goals(&goals_path(path))?;
            Ok(Ledger::restore(Vec::new(), budgets, goals))
        }
        result => result,
    }
}

/// Moves a malformed file out of the way so it is kept for inspection.
/// Earlier quarantined files are never replaced.
pub fn quarantine(path: &Path) -> Result<PathBuf, LedgerError> {
    let destination = quarantine_path(path);
    fs::rename(path, &destination).map_err(|source| LedgerError::io(path, source))?;
    info!(
        from = %path.display(),
        to = %destination.display(),
        "malformed file quarantined"
    );
    Ok(destination)
}

/**
 * Swaps every snapshot file with its `.bak`, so running it twice gets
 * back to where it started. The swapped in ledger has to load; when it
 * does not, the swap is undone and the load error returned.
 */
pub fn restore_backup(path: &Path) -> Result<Ledger, LedgerError> {
    let backup = backup_path(path);
    if !backup.exists() {
        return Err(LedgerError::NotFound(backup));
    }

    swap_with_backups(path)?;
    match load(path) {
        Ok(ledger) => {
            info!(
                path = %path.display(),
                transactions = ledger.list().len(),
                "backup restored"
            );
            Ok(ledger)
        }
        Err(err) => {
            warn!(error = %err, "backup does not load, putting the current files back");
            swap_with_backups(path)?;
            Err(err)
        }
    }
}

fn swap_with_backups(path: &Path) -> Result<(), LedgerError> {
    let mut renamed: Vec<(PathBuf, PathBuf)> = Vec::new();
    for current in snapshot_paths(path) {
        let backup = backup_path(&current);
        let parked = with_suffix(&current, ".swap");
        let steps = [
            (current.clone(), parked.clone()),
            (backup.clone(), current),
            (parked, backup),
        ];
        for (from, to) in steps {
            if !from.exists() {
                continue;
            }
            if let Err(source) = fs::rename(&from, &to) {
                undo_renames(&renamed);
                return Err(LedgerError::io(&from, source));
            }
            renamed.push((from, to));
        }
    }
    Ok(())
}

fn undo_renames(renamed: &[(PathBuf, PathBuf)]) {
    for (from, to) in renamed.iter().rev() {
        if let Err(err) = fs::rename(to, from) {
            warn!(from = %to.display(), to = %from.display(), error = %err, "could not undo rename");
        }
    }
}

fn reader(file: File) -> csv::Reader<File> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file)
}

fn read_error(path: &Path, err: csv::Error) -> LedgerError {
    if err.is_io_error() {
        return LedgerError::io(path, io::Error::from(err));
    }
    let line = err.position().map(|position| position.line());
    LedgerError::format(path, line, err.to_string())
}

fn read_transactions(path: &Path, file: File) -> Result<Vec<Transaction>, LedgerError> {
    let mut reader = reader(file);
    let headers = reader
        .headers()
        .map_err(|err| read_error(path, err))?
        .clone();

    let mut transactions = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut record = csv::StringRecord::new();
    while reader
        .read_record(&mut record)
        .map_err(|err| read_error(path, err))?
    {
        let line = record.position().map(|position| position.line());
        let stored: StoredTransaction = record
            .deserialize(Some(&headers))
            .map_err(|err| LedgerError::format(path, line, err.to_string()))?;
        let transaction = Transaction::try_from(stored)
            .map_err(|err| LedgerError::format(path, line, err.to_string()))?;

        if !seen_ids.insert(transaction.id) {
            return Err(LedgerError::format(
                path,
                line,
                format!("duplicate transaction id {}", transaction.id),
            ));
        }
        transactions.push(transaction);
    }
    Ok(transactions)
}

/// Sidecars are optional: a missing one reads as empty.
fn open_sidecar(path: &Path) -> Result<Option<File>, LedgerError> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(LedgerError::io(path, source)),
    }
}

fn load_budgets(path: &Path) -> Result<BTreeMap<String, Amount>, LedgerError> {
    let file = match open_sidecar(path)? {
        Some(file) => file,
        None => return Ok(BTreeMap::new()),
    };

    let mut budgets = BTreeMap::new();
    for result in reader(file).into_deserialize::<BudgetRow>() {
        let row = result.map_err(|err| read_error(path, err))?;
        let category = row.category.trim();
        if category.is_empty() || !row.amount.is_positive() {
            return Err(LedgerError::format(
                path,
                None,
                format!("invalid budget {:?} = {}", row.category, row.amount),
            ));
        }
        budgets.insert(category.to_string(), row.amount);
    }
    Ok(budgets)
}

/// Deadlines already in the past load fine; only new goals must be ahead.
fn load_goals(path: &Path) -> Result<Vec<Goal>, LedgerError> {
    let file = match open_sidecar(path)? {
        Some(file) => file,
        None => return Ok(Vec::new()),
    };

    let mut goals: Vec<Goal> = Vec::new();
    for result in reader(file).into_deserialize::<Goal>() {
        let goal = result.map_err(|err| read_error(path, err))?;
        let duplicate = goals
            .iter()
            .any(|seen| seen.name.to_lowercase() == goal.name.to_lowercase());
        if goal.name.is_empty()
            || duplicate
            || !goal.target.is_positive()
            || goal.saved < Amount::ZERO
        {
            return Err(LedgerError::format(
                path,
                None,
                format!("invalid goal {:?}", goal.name),
            ));
        }
        goals.push(goal);
    }
    Ok(goals)
}
