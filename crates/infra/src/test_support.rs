//! Builders shared by the infra unit tests.

use chrono::{DateTime, Duration, TimeZone, Utc};

use waypoint_core::{Aggregate, AggregateId};
use waypoint_transfers::settlement;
use waypoint_transfers::{
    AdvanceStatus, CreateTransfer, Location, Priority, RecordVerification, SmartContract, Transfer,
    TransferCommand, TransferId, TransferItem, TransferStatus, TransferType, TriggerCondition,
};

pub fn at(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap() + Duration::hours(hours)
}

pub fn create_command(transfer_type: TransferType) -> CreateTransfer {
    CreateTransfer {
        transfer_id: TransferId::new(AggregateId::new()),
        transfer_type,
        origin: Location::new("WH-SEA-01", "Seattle Central"),
        destination: Location::new("WH-PDX-02", "Portland North"),
        items: vec![
            TransferItem::new("Industrial router", 3, 10_000),
            TransferItem::new("Rack rail kit", 2, 5_000),
        ],
        priority: Priority::Medium,
        smart_contract: None,
        expected_arrival: at(24 * 10),
        initiated_by: "ops.lead".to_string(),
        occurred_at: at(0),
    }
}

pub fn contract_command(trigger: TriggerCondition) -> CreateTransfer {
    let mut cmd = create_command(TransferType::Inbound);
    cmd.smart_contract = Some(SmartContract::new("bank_transfer", 40_000, trigger).unwrap());
    cmd
}

fn run(transfer: &mut Transfer, cmd: TransferCommand) {
    let at = cmd.occurred_at();
    for event in transfer.handle(&cmd).unwrap() {
        transfer.apply(&event);
    }
    if let Some(payment) = settlement::settle(transfer, at).unwrap() {
        transfer.apply(&payment);
    }
}

fn from_command(cmd: CreateTransfer) -> Transfer {
    let mut transfer = Transfer::empty(cmd.transfer_id);
    run(&mut transfer, TransferCommand::CreateTransfer(cmd));
    transfer
}

pub fn created(transfer_type: TransferType) -> Transfer {
    from_command(create_command(transfer_type))
}

pub fn created_with_contract(trigger: TriggerCondition) -> Transfer {
    from_command(contract_command(trigger))
}

fn advance(transfer: &mut Transfer, to: TransferStatus, hour: i64) {
    let cmd = TransferCommand::AdvanceStatus(AdvanceStatus {
        transfer_id: transfer.id_typed(),
        to,
        actor: "dispatcher".to_string(),
        reason: None,
        occurred_at: at(hour),
    });
    run(transfer, cmd);
}

/// Walk forward to `target`, verifying guards on the way (one hour per step).
pub fn walk_to(transfer: &mut Transfer, target: TransferStatus) {
    let mut hour = 1;
    while transfer.status() != target {
        if let Some(step) = transfer.pending_guard() {
            let cmd = TransferCommand::RecordVerification(RecordVerification {
                transfer_id: transfer.id_typed(),
                step,
                verifier: "checkpoint".to_string(),
                verified: true,
                notes: None,
                occurred_at: at(hour),
            });
            run(transfer, cmd);
        }
        let next = transfer.status().successor().expect("target is reachable");
        advance(transfer, next, hour);
        hour += 1;
    }
}

pub fn reject(transfer: &mut Transfer, hour: i64) {
    advance(transfer, TransferStatus::Rejected, hour);
}
