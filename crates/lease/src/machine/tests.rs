use super::*;

const TTL: Duration = Duration::from_secs(120);
const T0: i64 = 1_700_000_000_000;

fn ana() -> Registrant {
    Registrant::try_new("Ana Silva", "ana@x.com").unwrap()
}

fn record_at(created_at_ms: i64) -> LeaseRecord {
    LeaseRecord::new(ana(), created_at_ms)
}

fn pending(remaining_secs: u64) -> LeaseStatus {
    LeaseStatus::Pending {
        registrant: ana(),
        remaining_secs,
    }
}

#[test]
fn observed_record_counts_down_from_created_at() {
    let mut machine = LeaseMachine::new(TTL);
    let value = record_at(T0).to_value();

    assert_eq!(machine.handle(Event::Observed(Some(value)), T0 + 30_000), None);
    assert_eq!(machine.status(T0 + 30_000), pending(90));

    assert_eq!(machine.handle(Event::Tick, T0 + 31_000), None);
    assert_eq!(machine.status(T0 + 31_000), pending(89));
}

fn observed(record: &LeaseRecord) -> Event {
    Event::Observed(Some(record.to_value()))
}

#[test]
fn tick_at_zero_expires_and_clears_once() {
    let mut machine = LeaseMachine::new(TTL);
    machine.handle(observed(&record_at(T0)), T0);
    assert_eq!(machine.status(T0), pending(120));

    assert_eq!(machine.handle(Event::Tick, T0 + 119_500), None);
    assert_eq!(machine.handle(Event::Tick, T0 + 120_000), Some(Effect::Clear));
    assert_eq!(
        machine.status(T0 + 120_000),
        LeaseStatus::Expiring {
            registrant: Some(ana())
        }
    );

    // In flight: further ticks do not issue a second delete.
    assert_eq!(machine.handle(Event::Tick, T0 + 121_000), None);

    // The delete landed, but only the store's snapshot frees the slot.
    assert_eq!(machine.handle(Event::ClearFinished { ok: true }, T0 + 121_000), None);
    assert!(matches!(machine.status(T0 + 121_000), LeaseStatus::Expiring { .. }));
    assert_eq!(machine.handle(Event::Tick, T0 + 122_000), None);

    assert_eq!(machine.handle(Event::Observed(None), T0 + 122_100), None);
    assert_eq!(machine.status(T0 + 122_100), LeaseStatus::Free);
}

#[test]
fn landed_clear_keeps_a_newer_lease() {
    let mut machine = LeaseMachine::new(TTL);
    machine.handle(observed(&record_at(T0)), T0);
    assert_eq!(machine.handle(Event::Tick, T0 + 120_000), Some(Effect::Clear));

    // Our delete frees the slot and someone else claims it before the clear
    // reports back.
    machine.handle(Event::Observed(None), T0 + 120_050);
    let bruno = Registrant::try_new("Bruno", "bruno@x.com").unwrap();
    machine.handle(
        observed(&LeaseRecord::new(bruno.clone(), T0 + 120_060)),
        T0 + 120_060,
    );
    assert_eq!(machine.handle(Event::ClearFinished { ok: true }, T0 + 120_100), None);

    let status = machine.status(T0 + 120_100);
    assert_eq!(status.registrant(), Some(&bruno));
    assert_eq!(status.remaining_secs(), Some(120));

    // The newer lease still gets its own clear when it runs out.
    assert_eq!(machine.handle(Event::Tick, T0 + 240_060), Some(Effect::Clear));
}

#[test]
fn expired_record_written_after_a_clear_is_cleared_again() {
    let mut machine = LeaseMachine::new(TTL);
    let stale = record_at(T0 - 120_000);
    assert_eq!(machine.handle(observed(&stale), T0), Some(Effect::Clear));
    machine.handle(Event::ClearFinished { ok: true }, T0 + 100);
    machine.handle(Event::Observed(None), T0 + 100);

    assert_eq!(machine.handle(observed(&stale), T0 + 200), Some(Effect::Clear));
}

#[test]
fn failed_clear_is_retried_on_next_tick() {
    let mut machine = LeaseMachine::new(TTL);
    machine.handle(observed(&record_at(T0)), T0);
    assert_eq!(machine.handle(Event::Tick, T0 + 120_000), Some(Effect::Clear));

    machine.handle(Event::ClearFinished { ok: false }, T0 + 120_100);
    assert!(matches!(machine.status(T0 + 120_100), LeaseStatus::Expiring { .. }));
    assert_eq!(machine.handle(Event::Tick, T0 + 121_000), Some(Effect::Clear));
}

#[test]
fn stale_record_on_join_is_cleared_immediately() {
    let mut machine = LeaseMachine::new(TTL);
    let value = record_at(T0 - 120_000).to_value();
    assert_eq!(machine.handle(Event::Observed(Some(value)), T0), Some(Effect::Clear));
    assert_eq!(machine.status(T0).remaining_secs(), Some(0));
}

#[test]
fn removal_by_device_frees_without_clearing() {
    let mut machine = LeaseMachine::new(TTL);
    machine.handle(Event::Observed(Some(record_at(T0).to_value())), T0);
    assert_eq!(machine.handle(Event::Observed(None), T0 + 40_000), None);
    assert_eq!(machine.status(T0 + 40_000), LeaseStatus::Free);
    assert_eq!(machine.handle(Event::Tick, T0 + 200_000), None);
}

#[test]
fn completed_flag_triggers_clear() {
    let mut machine = LeaseMachine::new(TTL);
    machine.handle(Event::Observed(Some(record_at(T0).to_value())), T0);
    let completed = record_at(T0).completed().to_value();
    assert_eq!(
        machine.handle(Event::Observed(Some(completed)), T0 + 10_000),
        Some(Effect::Clear)
    );
}

#[test]
fn unreadable_record_is_reclaimed() {
    let mut machine = LeaseMachine::new(TTL);
    let effect = machine.handle(Event::Observed(Some(serde_json::json!("garbage"))), T0);
    assert_eq!(effect, Some(Effect::Clear));
    assert_eq!(
        machine.status(T0),
        LeaseStatus::Expiring { registrant: None }
    );
}

#[test]
fn subscription_loss_is_terminal_unknown() {
    let mut machine = LeaseMachine::new(TTL);
    machine.handle(observed(&record_at(T0)), T0);
    machine.handle(Event::SubscriptionLost("reset".to_string()), T0 + 1_000);
    assert_eq!(machine.status(T0 + 1_000), LeaseStatus::Unknown);

    assert_eq!(machine.handle(Event::Tick, T0 + 500_000), None);
    assert_eq!(machine.handle(Event::Observed(None), T0 + 500_000), None);
    assert_eq!(machine.status(T0 + 500_000), LeaseStatus::Unknown);
}
