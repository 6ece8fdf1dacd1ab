// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/sensorflow

//! Fixed-cadence background tasks with a shared shutdown signal

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// One unit of periodic work. `tick` must handle its own failures: nothing it does may
/// stop the loop driving it.
#[async_trait]
pub trait PeriodicTask: Send {
    fn name(&self) -> &str;

    fn period(&self) -> Duration;

    /// Whether the first tick fires at start or one period later
    fn fire_immediately(&self) -> bool {
        true
    }

    async fn tick(&mut self);
}

/// Drive `task` on a fixed grid until `shutdown` fires or its sender is dropped.
///
/// Ticks stay aligned to the grid: a slow tick skips the boundaries it overran rather
/// than bunching the following ones together.
pub async fn run_periodic<T: PeriodicTask>(mut task: T, mut shutdown: broadcast::Receiver<()>) -> T {
    let period = task.period();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if !task.fire_immediately() {
        ticker.tick().await;
    }

    info!("Starting {} (every {:?})", task.name(), period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!("{} tick", task.name());
                task.tick().await;
            }
            _ = shutdown.recv() => {
                info!("{} shutting down...", task.name());
                break;
            }
        }
    }

    task
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        ticks: u32,
        immediate: bool,
    }

    #[async_trait]
    impl PeriodicTask for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn period(&self) -> Duration {
            Duration::from_millis(100)
        }

        fn fire_immediately(&self) -> bool {
            self.immediate
        }

        async fn tick(&mut self) {
            self.ticks += 1;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_until_shutdown() {
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_periodic(Counter { ticks: 0, immediate: true }, rx));

        tokio::time::sleep(Duration::from_millis(350)).await;
        tx.send(()).unwrap();
        let task = handle.await.unwrap();
        // t = 0, 100, 200, 300
        assert_eq!(task.ticks, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_first_tick() {
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_periodic(Counter { ticks: 0, immediate: false }, rx));

        tokio::time::sleep(Duration::from_millis(350)).await;
        drop(tx);
        let task = handle.await.unwrap();
        // t = 100, 200, 300
        assert_eq!(task.ticks, 3);
    }
}
