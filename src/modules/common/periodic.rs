use crate::modules::{common::signal::SIGNAL_MANAGER, error::RustScribeResult};
use std::{future::Future, time::Duration};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// A named background loop that ticks on a fixed interval until it is
/// cancelled through its [`TaskHandle`] or the process shutdown signal fires.
/// A failing tick is logged and the loop keeps running. Cancellation also
/// interrupts a tick that is still running; the in-flight future is dropped.
pub struct PeriodicTask {
    name: String,
}

pub struct TaskHandle {
    cancel_sender: Option<oneshot::Sender<()>>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    pub async fn cancel(self) {
        if let Some(sender) = self.cancel_sender {
            let _ = sender.send(());
        }
        let _ = self.join_handle.await;
    }
}

impl PeriodicTask {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }

    /// If `enable_cancel` is true, allows cancellation through TaskHandle::cancel
    pub fn start<F, T>(
        self,
        task: T,
        interval: Duration,
        enable_cancel: bool,
        run_immediately: bool,
    ) -> TaskHandle
    where
        T: Fn() -> F + Send + Sync + 'static,
        F: Future<Output = RustScribeResult<()>> + Send + 'static,
    {
        info!("Task '{}' started", &self.name);

        let (cancel_sender_opt, cancel_receiver_opt) = if enable_cancel {
            let (tx, rx) = oneshot::channel::<()>();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let name_clone = self.name.clone();

        let join_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            let mut shutdown = SIGNAL_MANAGER.subscribe();

            if !run_immediately {
                interval.tick().await; // discard first immediate tick
            }
            let mut cancel_receiver = cancel_receiver_opt;

            // pending() when cancellation is disabled, so the arm never fires
            async fn cancelled(receiver: &mut Option<oneshot::Receiver<()>>) {
                match receiver {
                    Some(rx) => {
                        rx.await.ok();
                    }
                    None => futures::future::pending().await,
                }
            }

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tokio::select! {
                            result = task() => {
                                if let Err(e) = result {
                                    warn!("Task '{}' failed: {:?}", name_clone, e);
                                }
                            }
                            _ = cancelled(&mut cancel_receiver) => {
                                info!("Task '{}' cancelled mid-iteration", name_clone);
                                break;
                            }
                            _ = shutdown.recv() => {
                                info!("Task '{}' shutting down mid-iteration", name_clone);
                                break;
                            }
                        }
                    }
                    _ = cancelled(&mut cancel_receiver) => {
                        info!("Task '{}' received cancellation signal", name_clone);
                        break;
                    }
                    _ = shutdown.recv() => {
                        info!("Task '{}' shutting down due to shutdown signal", name_clone);
                        break;
                    }
                }
            }

            info!("Task '{}' stopped", name_clone);
        });

        TaskHandle {
            cancel_sender: cancel_sender_opt,
            join_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_interrupts_an_in_flight_iteration() {
        let handle = PeriodicTask::new("slow-loop").start(
            || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_millis(10),
            true,
            true,
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        // The iteration above runs for a minute; cancel must not wait it out.
        tokio::time::timeout(Duration::from_secs(2), handle.cancel())
            .await
            .expect("cancellation waited on the running iteration");
    }

    #[tokio::test]
    async fn failing_iterations_keep_the_loop_alive() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let ticks = Arc::new(AtomicU32::new(0));
        let seen = ticks.clone();
        let handle = PeriodicTask::new("flaky-loop").start(
            move || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err(crate::raise_error!(
                        "tick failed".into(),
                        crate::modules::error::code::ErrorCode::InternalError
                    ))
                }
            },
            Duration::from_millis(10),
            true,
            true,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel().await;
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }
}
