use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::runtime::Runtime;
use waypoint_core::AggregateId;
use waypoint_events::{EventEnvelope, InMemoryEventBus};
use waypoint_infra::event_store::InMemoryEventStore;
use waypoint_infra::{EngineConfig, TransferFilter, TransferService};
use waypoint_transfers::{
    CreateTransfer, Location, Priority, RecordVerification, SmartContract, TransferId, TransferItem,
    TransferType, TriggerCondition, UpdateItems, VerificationStep,
};

type Service = TransferService<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn setup() -> (Runtime, Service) {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let service = TransferService::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryEventBus::new()),
        EngineConfig::default(),
    );
    (rt, service)
}

fn create_cmd(transfer_type: TransferType) -> CreateTransfer {
    let now = Utc::now();
    CreateTransfer {
        transfer_id: TransferId::new(AggregateId::new()),
        transfer_type,
        origin: Location::new("WH-A", "Warehouse A"),
        destination: Location::new("WH-B", "Warehouse B"),
        items: vec![TransferItem::new("Pallet", 12, 25_000)],
        priority: Priority::Medium,
        smart_contract: Some(SmartContract::new("escrow", 300_000, TriggerCondition::VerifiedReceipt).unwrap()),
        expected_arrival: now + Duration::days(5),
        initiated_by: "bench".to_string(),
        occurred_at: now,
    }
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");

    group.bench_function("create_transfer_fresh", |b| {
        let (rt, service) = setup();
        b.iter(|| {
            rt.block_on(service.create(black_box(create_cmd(TransferType::Inbound))))
                .unwrap();
        });
    });

    group.bench_function("failed_verification_with_history", |b| {
        let (rt, service) = setup();
        let cmd = create_cmd(TransferType::Outbound);
        let id = cmd.transfer_id;
        rt.block_on(service.create(cmd)).unwrap();

        let mut attempt = 0u64;
        b.iter(|| {
            attempt += 1;
            rt.block_on(service.record_verification(RecordVerification {
                transfer_id: id,
                step: VerificationStep::Shipping,
                verifier: format!("inspector-{attempt}"),
                verified: false,
                notes: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        });
    });

    group.finish();
}

fn bench_read_side(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_side");

    for count in [10usize, 100, 1000] {
        let (rt, service) = setup();
        for i in 0..count {
            let transfer_type = TransferType::ALL[i % TransferType::ALL.len()];
            rt.block_on(service.create(create_cmd(transfer_type))).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("list_critical", count), &count, |b, _| {
            let filter = TransferFilter {
                critical_only: true,
                ..TransferFilter::default()
            };
            b.iter(|| black_box(rt.block_on(service.list(&filter, Utc::now())).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("metrics", count), &count, |b, _| {
            b.iter(|| black_box(rt.block_on(service.metrics(None, Utc::now())).unwrap()));
        });
    }

    group.finish();
}

fn bench_replay_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_speed");

    for updates in [10usize, 100, 1000] {
        let (rt, service) = setup();
        let cmd = create_cmd(TransferType::Internal);
        let id = cmd.transfer_id;
        rt.block_on(service.create(cmd)).unwrap();
        for i in 0..updates {
            rt.block_on(service.update_items(UpdateItems {
                transfer_id: id,
                items: vec![TransferItem::new("Pallet", 1 + i as i64, 25_000)],
                actor: "bench".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        }

        group.bench_with_input(BenchmarkId::new("rebuild_from_events", updates), &updates, |b, _| {
            b.iter(|| black_box(service.replay(id).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_read_side,
    bench_replay_speed
);
criterion_main!(benches);
