use async_trait::async_trait;
use rtos_timer::{
    enter_isr, Status, TimerAttributes, TimerCallback, TimerError, TimerId, TimerKind, TimerService,
    TimerServiceConfig, TimerState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Counts how often it fired into the shared counter it is given.
struct CountingCallback;

#[async_trait]
impl TimerCallback<Arc<AtomicUsize>> for CountingCallback {
    async fn execute(&self, hits: &Arc<AtomicUsize>) -> Result<(), TimerError> {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingCallback;

#[async_trait]
impl TimerCallback<()> for FailingCallback {
    async fn execute(&self, _argument: &()) -> Result<(), TimerError> {
        Err(TimerError::CallbackError("Simulated error!".into()))
    }
}

/// Overruns its period on the first firing only.
struct SlowFirstCallback;

#[async_trait]
impl TimerCallback<Arc<AtomicUsize>> for SlowFirstCallback {
    async fn execute(&self, hits: &Arc<AtomicUsize>) -> Result<(), TimerError> {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            sleep(ms(35)).await;
        }
        Ok(())
    }
}

type SelfStopping = (TimerService, Arc<Mutex<Option<TimerId>>>, Arc<AtomicUsize>);

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn one_shot_fires_exactly_once_then_stops() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::named("one-shot"),
        )
        .unwrap();

    service.start(id, ms(100)).unwrap();
    assert!(service.is_running(id));

    sleep(ms(150)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!service.is_running(id));
    assert_eq!(service.state(id), Some(TimerState::Stopped));

    sleep(ms(500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn periodic_fires_once_per_interval_until_stopped() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Periodic,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start_ms(id, 100).unwrap();
    sleep(ms(350)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(service.is_running(id));
    assert_eq!(service.remaining(id), Some(ms(50)));

    service.stop(id).unwrap();
    sleep(ms(500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(service.statistics(id).unwrap().execution_count, 3);
}

#[tokio::test(start_paused = true)]
async fn restart_resets_the_countdown() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start(id, ms(100)).unwrap();
    sleep(ms(60)).await;
    service.start(id, ms(100)).unwrap();
    assert_eq!(service.remaining(id), Some(ms(100)));

    sleep(ms(60)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(service.is_running(id));

    sleep(ms(60)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!service.is_running(id));
}

#[tokio::test(start_paused = true)]
async fn stopped_timer_can_be_started_again() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start(id, ms(50)).unwrap();
    service.stop(id).unwrap();
    assert_eq!(Status::from(service.stop(id)), Status::ErrorResource);

    sleep(ms(100)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    service.start(id, ms(50)).unwrap();
    sleep(ms(100)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_running_timer_cancels_it() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Periodic,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start(id, ms(10)).unwrap();
    sleep(ms(25)).await;
    service.delete(id).unwrap();
    sleep(ms(100)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(!service.is_running(id));
    assert_eq!(service.state(id), None);
    assert!(service.is_empty());
    assert_eq!(Status::from(service.delete(id)), Status::ErrorParameter);
}

#[tokio::test(start_paused = true)]
async fn callback_errors_are_counted_not_propagated() {
    let service = TimerService::new().unwrap();
    let id = service
        .create(
            TimerKind::Periodic,
            FailingCallback,
            (),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start(id, ms(10)).unwrap();
    sleep(ms(35)).await;

    let stats = service.statistics(id).unwrap();
    assert_eq!(stats.execution_count, 3);
    assert_eq!(stats.error_count, 3);
    assert_eq!(stats.elapsed_time, ms(30));
    assert!(service.is_running(id));
}

#[tokio::test(start_paused = true)]
async fn callback_may_stop_its_own_timer() {
    let service = TimerService::new().unwrap();
    let slot = Arc::new(Mutex::new(None));
    let hits = Arc::new(AtomicUsize::new(0));

    let id = service
        .create(
            TimerKind::Periodic,
            |(service, slot, hits): &SelfStopping| -> Result<(), TimerError> {
                if hits.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                    if let Some(id) = *slot.lock().unwrap() {
                        service.stop(id)?;
                    }
                }
                Ok(())
            },
            (service.clone(), Arc::clone(&slot), Arc::clone(&hits)),
            TimerAttributes::default(),
        )
        .unwrap();
    *slot.lock().unwrap() = Some(id);

    service.start(id, ms(10)).unwrap();
    sleep(ms(100)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert!(!service.is_running(id));
    service.shutdown();
}

#[tokio::test(start_paused = true)]
async fn callbacks_outlive_the_arming_task() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let arming = {
        let service = service.clone();
        let hits = Arc::clone(&hits);
        tokio::spawn(async move {
            let id = service
                .create(TimerKind::Once, CountingCallback, hits, TimerAttributes::default())
                .unwrap();
            service.start(id, ms(5)).unwrap();
            id
        })
    };
    let id = arming.await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    sleep(ms(10)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!service.is_running(id));
}

#[tokio::test(start_paused = true)]
async fn names_and_kinds_are_queryable() {
    let service = TimerService::with_config(TimerServiceConfig::default().with_name("board")).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Periodic,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::named("heartbeat"),
        )
        .unwrap();

    assert_eq!(service.config().name, "board");
    assert_eq!(service.name(id).as_deref(), Some("heartbeat"));
    assert_eq!(service.kind(id), Some(TimerKind::Periodic));

    let err = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::named(""),
        )
        .unwrap_err();
    assert_eq!(err.status(), Status::ErrorParameter);
}

#[tokio::test(start_paused = true)]
async fn isr_context_is_rejected_with_isr_status() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();

    let status = {
        let _isr = enter_isr();
        Status::from(service.start(id, ms(10)))
    };
    assert_eq!(status, Status::ErrorIsr);
    assert_eq!(status.code(), -6);
    assert!(!service.is_running(id));
}

#[tokio::test(start_paused = true)]
async fn slow_callback_is_followed_by_catch_up_firings() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let id = service
        .create(
            TimerKind::Periodic,
            SlowFirstCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start(id, ms(10)).unwrap();

    // First firing at 10 ms runs until 45 ms; the 20, 30 and 40 ms expiries follow back to back.
    sleep(ms(46)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    assert_eq!(service.remaining(id), Some(ms(4)));

    sleep(ms(9)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 5);
    assert_eq!(service.remaining(id), Some(ms(5)));
    assert!(service.is_running(id));
}

#[tokio::test(start_paused = true)]
async fn panicking_callback_does_not_stop_the_dispatcher() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let faulty = service
        .create(
            TimerKind::Once,
            |_: &()| -> Result<(), TimerError> { panic!("callback blew up") },
            (),
            TimerAttributes::named("faulty"),
        )
        .unwrap();
    let healthy = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::named("healthy"),
        )
        .unwrap();

    service.start(faulty, ms(5)).unwrap();
    sleep(ms(10)).await;
    service.start(healthy, ms(10)).unwrap();
    sleep(ms(20)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    let stats = service.statistics(faulty).unwrap();
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.error_count, 1);
    assert!(!service.is_running(faulty));
}

#[tokio::test(start_paused = true)]
async fn stopping_a_collected_one_shot_suppresses_it() {
    let service = TimerService::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let target = service
        .create(
            TimerKind::Once,
            CountingCallback,
            Arc::clone(&hits),
            TimerAttributes::default(),
        )
        .unwrap();
    let stopper = service
        .create(
            TimerKind::Once,
            |(service, target): &(TimerService, TimerId)| service.stop(*target),
            (service.clone(), target),
            TimerAttributes::default(),
        )
        .unwrap();

    service.start(stopper, ms(5)).unwrap();
    service.start(target, ms(10)).unwrap();
    tokio::time::advance(ms(20)).await;
    sleep(ms(1)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    let stats = service.statistics(stopper).unwrap();
    assert_eq!((stats.execution_count, stats.error_count), (1, 0));
    assert!(!service.is_running(target));
    service.shutdown();
}
