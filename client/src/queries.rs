//! Read-side helpers: the filters, orderings and dashboard figures the
//! screens derive from the loaded collections. Everything here borrows
//! the store's slices and leaves them untouched.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

use shared::{Activity, Payment, PaymentStatus, Process};

/// Processes matching the search box, important ones first, the rest in
/// natural order of their process number ("2/2024" sorts before
/// "10/2024").
pub fn search_processes<'a>(processes: &'a [Process], term: &str) -> Vec<&'a Process> {
    let needle = term.to_lowercase();
    let mut rows: Vec<&Process> = processes
        .iter()
        .filter(|p| {
            p.process_number.to_lowercase().contains(&needle)
                || p.supplier.to_lowercase().contains(&needle)
        })
        .collect();
    rows.sort_by(|a, b| {
        let a_important = a.is_important.unwrap_or(false);
        let b_important = b.is_important.unwrap_or(false);
        b_important
            .cmp(&a_important)
            .then_with(|| natural_cmp(&a.process_number, &b.process_number))
    });
    rows
}

/// Which status bucket the payments screen is filtering on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusSelection {
    #[default]
    All,
    /// Either of the statuses still waiting on settlement.
    AnyPending,
    /// Scheduled payments whose date is the reference day.
    ScheduledToday,
    /// Paid payments whose date is the reference day.
    PaidToday,
    Exactly(PaymentStatus),
}

/// Filter set applied by the payments screen. `month` is zero-padded
/// ("01" to "12") and `date_range` bounds are inclusive `YYYY-MM-DD`
/// dates; an explicit range overrides the month and year dropdowns.
#[derive(Debug, Clone, Copy, Default)]
pub struct PaymentQuery<'a> {
    pub term: &'a str,
    pub status: StatusSelection,
    pub month: Option<&'a str>,
    pub year: Option<&'a str>,
    pub date_range: Option<(&'a str, &'a str)>,
}

/// Payments matching the query, newest creation first.
pub fn search_payments<'a>(
    payments: &'a [Payment],
    query: &PaymentQuery<'_>,
    today: &str,
) -> Vec<&'a Payment> {
    let needle = query.term.to_lowercase();
    let mut rows: Vec<&Payment> = payments
        .iter()
        .filter(|p| {
            p.process_number.to_lowercase().contains(&needle)
                || p.supplier.to_lowercase().contains(&needle)
        })
        .filter(|p| matches_status(p, query.status, today))
        .filter(|p| matches_period(p, query))
        .collect();
    rows.sort_by(|a, b| created_desc(a, b));
    rows
}

/// Latest payments for the dashboard, newest first; entries without a
/// creation time sort last.
pub fn recent_payments(payments: &[Payment], limit: usize) -> Vec<&Payment> {
    let mut rows: Vec<&Payment> = payments.iter().collect();
    rows.sort_by(|a, b| created_desc(a, b));
    rows.truncate(limit);
    rows
}

/// Counter row at the top of the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardTotals {
    pub pending: usize,
    pub registered_at_bank: usize,
    pub scheduled_today: usize,
    pub paid_today: usize,
}

pub fn dashboard_totals(payments: &[Payment], today: &str) -> DashboardTotals {
    let mut totals = DashboardTotals::default();
    for payment in payments {
        if payment.status.is_pending() {
            totals.pending += 1;
        }
        if payment.status == PaymentStatus::RegisteredAtBank {
            totals.registered_at_bank += 1;
        }
        let due_today = payment.payment_date.as_deref() == Some(today);
        if due_today && payment.status == PaymentStatus::Scheduled {
            totals.scheduled_today += 1;
        }
        if due_today && payment.status == PaymentStatus::Paid {
            totals.paid_today += 1;
        }
    }
    totals
}

/// Activity entries matching the selected kind and inclusive day range,
/// in stored (newest-first) order.
pub fn filter_activities<'a>(
    activities: &'a [Activity],
    kind: Option<&str>,
    date_range: Option<(&str, &str)>,
) -> Vec<&'a Activity> {
    activities
        .iter()
        .filter(|act| kind.map_or(true, |k| act.kind == k))
        .filter(|act| {
            date_range.map_or(true, |(start, end)| {
                act.timestamp
                    .get(..10)
                    .map_or(false, |day| day >= start && day <= end)
            })
        })
        .collect()
}

/// Processes whose alert fires on the reference day.
pub fn alerts_for<'a>(processes: &'a [Process], today: &str) -> Vec<&'a Process> {
    processes
        .iter()
        .filter(|p| p.alert.as_ref().is_some_and(|alert| alert.date == today))
        .collect()
}

/// Distinct years present in the payment dates, newest first. Feeds the
/// year dropdown.
pub fn payment_years(payments: &[Payment]) -> Vec<String> {
    distinct_years(payments.iter().filter_map(|p| p.payment_date.as_deref()))
}

/// Distinct years present in the activity timestamps, newest first.
pub fn activity_years(activities: &[Activity]) -> Vec<String> {
    distinct_years(activities.iter().map(|a| a.timestamp.as_str()))
}

fn matches_status(payment: &Payment, selection: StatusSelection, today: &str) -> bool {
    match selection {
        StatusSelection::All => true,
        StatusSelection::AnyPending => payment.status.is_pending(),
        StatusSelection::ScheduledToday => {
            payment.status == PaymentStatus::Scheduled
                && payment.payment_date.as_deref() == Some(today)
        }
        StatusSelection::PaidToday => {
            payment.status == PaymentStatus::Paid
                && payment.payment_date.as_deref() == Some(today)
        }
        StatusSelection::Exactly(status) => payment.status == status,
    }
}

fn matches_period(payment: &Payment, query: &PaymentQuery<'_>) -> bool {
    let Some(date) = payment.payment_date.as_deref() else {
        // Undated payments only survive when no period filter is set.
        return query.date_range.is_none() && query.month.is_none() && query.year.is_none();
    };
    if let Some((start, end)) = query.date_range {
        return date >= start && date <= end;
    }
    match (query.month, query.year) {
        (Some(month), Some(year)) => date.starts_with(&format!("{year}-{month}")),
        (Some(month), None) => date.get(5..7) == Some(month),
        (None, Some(year)) => date.starts_with(year),
        (None, None) => true,
    }
}

fn created_desc(a: &Payment, b: &Payment) -> Ordering {
    b.created_at
        .as_deref()
        .unwrap_or("")
        .cmp(a.created_at.as_deref().unwrap_or(""))
}

/// Case-insensitive ordering that compares digit runs by numeric value,
/// the collation the process list uses for its numbers.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let xs = take_digits(&mut left);
                let ys = take_digits(&mut right);
                // Leading zeros dropped; longer run of significant
                // digits means larger number.
                let xs = xs.trim_start_matches('0');
                let ys = ys.trim_start_matches('0');
                let ord = xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(*c);
        chars.next();
    }
    run
}

fn distinct_years<'a>(dates: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut years: Vec<String> = dates
        .filter_map(|date| date.get(..4))
        .map(str::to_string)
        .collect();
    years.sort();
    years.dedup();
    years.reverse();
    years
}
