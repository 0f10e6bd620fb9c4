use std::sync::Arc;

use serde_json::Value as JsonValue;

use waypoint_events::{EventBus, EventEnvelope, InMemoryEventBus};
use waypoint_infra::event_store::InMemoryEventStore;
use waypoint_infra::{Clock, EngineConfig, TransferService};
use waypoint_transfers::TransferEvent;

pub type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// The service shared by every handler.
pub type AppServices = TransferService<Arc<InMemoryEventStore>, AppBus>;

pub fn build_services(config: EngineConfig) -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: AppBus = Arc::new(InMemoryEventBus::new());

    spawn_payment_log(&bus);

    // Handlers stamp commands on arrival; the clock restamps them under the
    // transfer's lock so the timeline follows commit order.
    TransferService::new(store, bus, config).with_clock(Clock::system())
}

/// Log every payment instruction that reaches the bus.
///
/// Stands in for a payment executor: it sees each instruction once per
/// commit, keyed by stream position.
fn spawn_payment_log(bus: &AppBus) {
    let subscription = bus.subscribe();

    std::thread::spawn(move || {
        while let Ok(envelope) = subscription.recv() {
            let decoded: Result<TransferEvent, _> = serde_json::from_value(envelope.payload().clone());
            match decoded {
                Ok(TransferEvent::PaymentSettled(payment)) => tracing::info!(
                    transfer_id = %payment.transfer_id,
                    sequence = envelope.sequence_number(),
                    amount = payment.amount,
                    method = %payment.payment_method,
                    outcome = %payment.outcome,
                    "payment instruction received"
                ),
                Ok(_) => {}
                Err(err) => tracing::warn!(
                    aggregate_id = %envelope.aggregate_id(),
                    error = %err,
                    "undecodable envelope on bus"
                ),
            }
        }
    });
}
