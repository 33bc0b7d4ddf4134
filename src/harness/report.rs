use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::models::{Allocation, Pool, TicketRange};

/// Результат одной попытки покупки, как его увидел клиент.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Purchased {
        target: String,
        user_id: String,
        tickets: Vec<i64>,
    },
    Rejected {
        target: String,
        status: u16,
        error: String,
    },
    /// Ответа нет или это 5xx: выдача могла закоммититься без ведома клиента.
    TransportFailed {
        target: String,
        error: String,
    },
}

/// Итог прогона: счётчики для диагностики и список нарушенных инвариантов.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarnessReport {
    pub attempts: usize,
    pub successes: usize,
    pub rejections: usize,
    pub transport_failures: usize,
    pub rejection_reasons: BTreeMap<String, usize>,
    pub successes_by_target: BTreeMap<String, usize>,
    pub tickets_returned: usize,
    pub unique_tickets: usize,
    pub duplicate_tickets: usize,
    pub pool_total: Option<i64>,
    pub pool_available: Option<i64>,
    pub pool_next_ticket_number: Option<i64>,
    pub ledger_allocations: usize,
    pub oversold: bool,
    pub violations: Vec<String>,
}

impl HarnessReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Сверяет всё, что вернули покупатели, с финальным состоянием пула и журнала.
pub fn verify(outcomes: &[AttemptOutcome], pool: Option<&Pool>, ledger: &[Allocation]) -> HarnessReport {
    let mut report = HarnessReport {
        attempts: outcomes.len(),
        ledger_allocations: ledger.len(),
        ..HarnessReport::default()
    };

    let mut returned: Vec<i64> = Vec::new();
    for outcome in outcomes {
        match outcome {
            AttemptOutcome::Purchased { target, tickets, .. } => {
                report.successes += 1;
                *report.successes_by_target.entry(target.clone()).or_default() += 1;
                returned.extend_from_slice(tickets);
            }
            AttemptOutcome::Rejected { error, .. } => {
                report.rejections += 1;
                *report.rejection_reasons.entry(error.clone()).or_default() += 1;
            }
            AttemptOutcome::TransportFailed { .. } => report.transport_failures += 1,
        }
    }

    let unique: HashSet<i64> = returned.iter().copied().collect();
    report.tickets_returned = returned.len();
    report.unique_tickets = unique.len();
    report.duplicate_tickets = returned.len() - unique.len();

    if report.duplicate_tickets > 0 {
        report
            .violations
            .push(format!("{} duplicate ticket numbers returned", report.duplicate_tickets));
    }

    let Some(pool) = pool else {
        report.violations.push("ticket pool is missing from the store".to_string());
        return report;
    };

    report.pool_total = Some(pool.total);
    report.pool_available = Some(pool.available);
    report.pool_next_ticket_number = Some(pool.next_ticket_number);
    report.oversold = pool.available < 0 || returned.len() as i64 > pool.total;

    if report.oversold {
        report.violations.push(format!(
            "oversold: {} tickets returned against total {}, available {}",
            returned.len(),
            pool.total,
            pool.available
        ));
    }
    if let Err(violation) = pool.check_invariants() {
        report.violations.push(format!("pool invariant violated: {violation}"));
    }
    if let Some(ticket) = returned.iter().find(|t| **t < 1 || **t > pool.issued()) {
        report
            .violations
            .push(format!("ticket {ticket} lies outside issued range 1..={}", pool.issued()));
    }

    check_ledger(&mut report, pool, ledger, &unique);
    report
}

fn check_ledger(report: &mut HarnessReport, pool: &Pool, ledger: &[Allocation], returned: &HashSet<i64>) {
    let mut ranges: Vec<TicketRange> = ledger.iter().map(Allocation::range).collect();
    ranges.sort_by_key(|r| (r.start, r.end));

    if let Some(pair) = ranges.windows(2).find(|w| w[0].overlaps(&w[1])) {
        report.violations.push(format!(
            "ledger ranges overlap: {}..={} and {}..={}",
            pair[0].start, pair[0].end, pair[1].start, pair[1].end
        ));
    }

    let ledger_issued: i64 = ranges.iter().map(TicketRange::len).sum();
    if ledger_issued != pool.issued() {
        report.violations.push(format!(
            "ledger covers {ledger_issued} tickets but pool issued {}",
            pool.issued()
        ));
    }

    if let Some(ticket) = returned.iter().find(|t| !ranges.iter().any(|r| r.contains(**t))) {
        report
            .violations
            .push(format!("returned ticket {ticket} has no ledger record"));
    }

    // Без обрывов связи и 5xx каждая выдача в журнале должна была дойти до покупателя.
    if report.transport_failures == 0 && ledger_issued != returned.len() as i64 {
        report.violations.push(format!(
            "ledger covers {ledger_issued} tickets but purchasers received {}",
            returned.len()
        ));
    }
}

impl fmt::Display for HarnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== CONSISTENCY RESULTS ===")?;
        writeln!(f, "Attempts: {}", self.attempts)?;
        writeln!(f, "Successful purchases: {}", self.successes)?;
        for (target, count) in &self.successes_by_target {
            writeln!(f, "  via {target}: {count}")?;
        }
        writeln!(f, "Rejected purchases: {}", self.rejections)?;
        for (reason, count) in &self.rejection_reasons {
            writeln!(f, "  {reason}: {count}")?;
        }
        writeln!(f, "Transport failures / 5xx (outcome unknown): {}", self.transport_failures)?;
        writeln!(f, "Tickets returned: {}", self.tickets_returned)?;
        writeln!(f, "Unique ticket numbers: {}", self.unique_tickets)?;
        writeln!(f, "Duplicate ticket numbers: {}", self.duplicate_tickets)?;
        match (self.pool_total, self.pool_available, self.pool_next_ticket_number) {
            (Some(total), Some(available), Some(next)) => writeln!(
                f,
                "DB total: {total} DB available: {available} DB next ticket: {next}"
            )?,
            _ => writeln!(f, "DB pool: missing")?,
        }
        writeln!(f, "Ledger allocations: {}", self.ledger_allocations)?;
        writeln!(f, "Oversold detected: {}", self.oversold)?;
        if self.violations.is_empty() {
            write!(f, "All invariants hold")
        } else {
            writeln!(f, "Violations:")?;
            for v in &self.violations {
                writeln!(f, "  - {v}")?;
            }
            Ok(())
        }
    }
}
