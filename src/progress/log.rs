use crate::profile::ActivityEntry;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub fn total_for_date(history: &[ActivityEntry], date: NaiveDate) -> u64 {
    history
        .iter()
        .filter(|entry| entry.date == date)
        .map(|entry| u64::from(entry.points))
        .sum()
}

/// Sums the last `n` distinct days that have any activity. Idle days are
/// skipped, so this is not a fixed calendar window.
pub fn total_for_last_n_active_days(history: &[ActivityEntry], n: usize) -> u64 {
    let by_date = totals_by_date(history);
    let skip = by_date.len().saturating_sub(n);

    by_date.values().skip(skip).sum()
}

pub fn totals_by_date(history: &[ActivityEntry]) -> BTreeMap<NaiveDate, u64> {
    history.iter().fold(BTreeMap::new(), |mut acc, entry| {
        *acc.entry(entry.date).or_insert(0) += u64::from(entry.points);
        acc
    })
}

/// Entries logged on `date`, newest first.
pub fn entries_on(history: &[ActivityEntry], date: NaiveDate) -> Vec<ActivityEntry> {
    let mut entries = history
        .iter()
        .filter(|entry| entry.date == date)
        .cloned()
        .collect::<Vec<_>>();
    entries.sort_by(|left, right| right.timestamp.cmp(&left.timestamp));
    entries
}
