use async_trait::async_trait;
use std::time::Duration;
use rtos_timer::{
    enter_isr, Status, TimerAttributes, TimerCallback, TimerError, TimerKind, TimerService,
    TimerServiceConfig,
};
use tokio::time::sleep;

struct OneTimeCallback;
struct BlinkCallback;
struct ErrorCallback;

#[async_trait]
impl TimerCallback<&'static str> for OneTimeCallback {
    async fn execute(&self, message: &&'static str) -> Result<(), TimerError> {
        println!("One-shot timer executed: {}", message);
        Ok(())
    }
}

#[async_trait]
impl TimerCallback<u8> for BlinkCallback {
    async fn execute(&self, led: &u8) -> Result<(), TimerError> {
        println!("Toggling LED {}", led);
        Ok(())
    }
}

#[async_trait]
impl TimerCallback<()> for ErrorCallback {
    async fn execute(&self, _argument: &()) -> Result<(), TimerError> {
        Err(TimerError::CallbackError("Simulated error!".into()))
    }
}

#[tokio::main]
async fn main() -> Result<(), TimerError> {
    let service = TimerService::with_config(
        TimerServiceConfig::default()
            .with_name("showcase")
            .with_max_timers(4),
    )?;

    // 1. One-shot timer
    let once = service.create(
        TimerKind::Once,
        OneTimeCallback,
        "hello from the timer context",
        TimerAttributes::named("once"),
    )?;
    service.start(once, Duration::from_secs(1))?;

    // 2. Periodic timer
    let blink = service.create(
        TimerKind::Periodic,
        BlinkCallback,
        3,
        TimerAttributes::named("blink"),
    )?;
    service.start_ms(blink, 500)?;

    sleep(Duration::from_millis(2_200)).await;
    println!("Running timers: {:?}", service.list_timers());

    // 3. Restart with a new period
    println!("Slowing down {}...", blink);
    service.start(blink, Duration::from_secs(1))?;
    sleep(Duration::from_secs(3)).await;

    // 4. Statistics
    if let Some(stats) = service.statistics(blink) {
        println!("Statistics of {:?}: {:?}", service.name(blink), stats);
    }

    // 5. Status codes
    service.stop(blink)?;
    let status = Status::from(service.stop(blink));
    println!("Stopping twice: {:?} ({})", status, status.code());

    {
        let _isr = enter_isr();
        let status = Status::from(service.start(blink, Duration::from_secs(1)));
        println!("Starting from an ISR: {:?} ({})", status, status.code());
    }

    // 6. Error handling
    let failing = service.create(
        TimerKind::Once,
        ErrorCallback,
        (),
        TimerAttributes::default(),
    )?;
    service.start(failing, Duration::from_millis(100))?;
    sleep(Duration::from_millis(200)).await;
    if let Some(stats) = service.statistics(failing) {
        println!("Failed executions: {}", stats.error_count);
    }

    service.delete(once)?;
    service.delete(blink)?;
    service.delete(failing)?;
    service.shutdown();
    println!("All timers completed!");
    Ok(())
}
