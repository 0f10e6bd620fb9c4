//! Aggregate metrics over the transfer store.
//!
//! Stateless: every call recomputes from the snapshots it is given.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use waypoint_transfers::{CriticalityPolicy, PaymentStatus, Transfer, TransferStatus, TransferType, classify};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeTotals {
    pub count: usize,
    /// Minor currency units.
    pub value: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettlementTotals {
    pub pending_count: usize,
    pub pending_amount: u64,
    pub released_count: usize,
    pub released_amount: u64,
    pub voided_count: usize,
    pub voided_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total_transfers: usize,
    pub by_status: BTreeMap<TransferStatus, usize>,
    pub by_type: BTreeMap<TransferType, TypeTotals>,
    /// COMPLETED / (COMPLETED + REJECTED) over transfers that finished inside
    /// the window. `None` when nothing finished.
    pub success_rate: Option<f64>,
    pub window_days: i64,
    /// Mean seconds spent per status. Open intervals run to `now`.
    pub avg_time_in_status_secs: BTreeMap<TransferStatus, f64>,
    /// Value of transfers that are neither completed nor rejected.
    pub open_value: u64,
    pub critical_count: usize,
    pub settlement: SettlementTotals,
}

/// Compute metrics for `transfers` as of `now`.
pub fn aggregate(
    transfers: &[Transfer],
    window: Duration,
    now: DateTime<Utc>,
    policy: &CriticalityPolicy,
) -> AggregateMetrics {
    let mut by_status: BTreeMap<TransferStatus, usize> =
        TransferStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    let mut by_type: BTreeMap<TransferType, TypeTotals> =
        TransferType::ALL.into_iter().map(|t| (t, TypeTotals::default())).collect();
    let mut dwell: BTreeMap<TransferStatus, (i64, u32)> = BTreeMap::new();
    let mut settlement = SettlementTotals::default();
    let (mut completed, mut rejected) = (0u32, 0u32);
    let mut open_value = 0u64;
    let mut critical_count = 0;
    // Windows reaching past the representable range cover all history.
    let window_start = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

    for transfer in transfers {
        let value = transfer.total_value();
        let status = transfer.status();

        *by_status.entry(status).or_default() += 1;
        let totals = by_type.entry(transfer.transfer_type()).or_default();
        totals.count += 1;
        totals.value = totals.value.saturating_add(value);

        if status.is_terminal() {
            let finished = transfer.status_update_time();
            if finished >= window_start && finished <= now {
                match status {
                    TransferStatus::Completed => completed += 1,
                    _ => rejected += 1,
                }
            }
        } else {
            open_value = open_value.saturating_add(value);
        }

        if classify(transfer, now, policy).is_critical {
            critical_count += 1;
        }

        let history = transfer.status_history();
        for (idx, change) in history.iter().enumerate() {
            let until = match history.get(idx + 1) {
                Some(next) => next.entered_at,
                None if change.status.is_terminal() => continue,
                None => now,
            };
            let entry = dwell.entry(change.status).or_insert((0, 0));
            entry.0 += (until - change.entered_at).num_seconds().max(0);
            entry.1 += 1;
        }

        if let Some(contract) = transfer.smart_contract() {
            let amount = contract.payment_amount();
            match contract.payment_status() {
                PaymentStatus::Pending => {
                    settlement.pending_count += 1;
                    settlement.pending_amount = settlement.pending_amount.saturating_add(amount);
                }
                PaymentStatus::Completed => {
                    settlement.released_count += 1;
                    settlement.released_amount = settlement.released_amount.saturating_add(amount);
                }
                PaymentStatus::Failed => {
                    settlement.voided_count += 1;
                    settlement.voided_amount = settlement.voided_amount.saturating_add(amount);
                }
            }
        }
    }

    let finished = completed + rejected;
    let success_rate = (finished > 0).then(|| f64::from(completed) / f64::from(finished));

    AggregateMetrics {
        total_transfers: transfers.len(),
        by_status,
        by_type,
        success_rate,
        window_days: window.num_days(),
        avg_time_in_status_secs: dwell
            .into_iter()
            .map(|(status, (secs, n))| (status, secs as f64 / f64::from(n)))
            .collect(),
        open_value,
        critical_count,
        settlement,
    }
}
