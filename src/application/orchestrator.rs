use crate::application::timeline::{Effect, Event, Timeline, TimelineSnapshot};
use crate::config::Config;
use crate::domain::payment::{PaymentMethod, PurchaseMode};
use crate::domain::ports::CommerceBackendRef;
use crate::domain::product::Product;
use crate::error::{Result, TimelineError};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

enum Command {
    Event(Event),
    Snapshot(oneshot::Sender<TimelineSnapshot>),
}

/// Outcome of a timer or call, tagged with the epoch it was issued for.
struct Completion {
    epoch: u64,
    event: Event,
}

/// Runs a [`Timeline`] on tokio.
///
/// The orchestrator is the only owner of timers and in-flight calls. When the timeline
/// opens a new epoch every task from the previous one is aborted, and completions that
/// still arrive carrying an old epoch are dropped.
pub struct Orchestrator {
    timeline: Timeline,
    backend: CommerceBackendRef,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    tasks: JoinSet<()>,
    snapshots: watch::Sender<TimelineSnapshot>,
}

impl Orchestrator {
    /// Starts the orchestrator on the current runtime and returns a handle to it.
    ///
    /// The orchestrator stops once every handle has been dropped.
    pub fn spawn(backend: CommerceBackendRef, config: &Config) -> TimelineHandle {
        let timeline = Timeline::new(config);
        let (commands_tx, commands) = mpsc::channel(32);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(timeline.snapshot());

        let orchestrator = Self {
            timeline,
            backend,
            commands,
            completions_tx,
            completions,
            tasks: JoinSet::new(),
            snapshots,
        };
        tokio::spawn(orchestrator.run());

        TimelineHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Event(event)) => self.apply(event),
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(self.timeline.snapshot());
                    }
                    None => break,
                },
                Some(completion) = self.completions.recv() => {
                    if completion.epoch == self.timeline.epoch() {
                        self.apply(completion.event);
                    } else {
                        debug!(epoch = completion.epoch, "dropping completion from a cancelled run");
                    }
                }
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
            }
        }
        self.tasks.abort_all();
        debug!("orchestrator stopped");
    }

    fn apply(&mut self, event: Event) {
        let effects = self.timeline.handle(event);
        let epoch = self.timeline.epoch();
        for effect in effects {
            self.execute(effect, epoch);
        }
        self.snapshots.send_replace(self.timeline.snapshot());
    }

    fn execute(&mut self, effect: Effect, epoch: u64) {
        match effect {
            Effect::CancelPending => {
                debug!(pending = self.tasks.len(), "cancelling pending work");
                self.tasks.abort_all();
            }
            Effect::Schedule { after, timer } => {
                let tx = self.completions_tx.clone();
                self.tasks.spawn(async move {
                    tokio::time::sleep(after).await;
                    let _ = tx.send(Completion {
                        epoch,
                        event: Event::TimerElapsed(timer),
                    });
                });
            }
            Effect::SendIntent(prompt) => {
                let backend = Arc::clone(&self.backend);
                let tx = self.completions_tx.clone();
                self.tasks.spawn(async move {
                    let result = backend.send_intent(&prompt).await;
                    let _ = tx.send(Completion {
                        epoch,
                        event: Event::IntentCompleted(result),
                    });
                });
            }
            Effect::ProcessPayment { method, amount } => {
                info!(%method, %amount, "issuing payment");
                let backend = Arc::clone(&self.backend);
                let tx = self.completions_tx.clone();
                self.tasks.spawn(async move {
                    let result = backend.process_payment(&method).await;
                    let _ = tx.send(Completion {
                        epoch,
                        event: Event::PaymentCompleted(result),
                    });
                });
            }
            Effect::UpdateProduct(product) => {
                spawn_detached(Arc::clone(&self.backend), product);
            }
        }
    }
}

/// Pushes the selected product to the backend without waiting for the outcome.
///
/// The task is not tracked by any run. Failures are logged and otherwise ignored.
pub fn spawn_detached(backend: CommerceBackendRef, product: Product) -> JoinHandle<()> {
    tokio::spawn(async move {
        match backend.update_product(&product).await {
            Ok(()) => debug!(product = %product.name, "backend cart updated"),
            Err(e) => warn!(
                error = %e,
                product = %product.name,
                "failed to update product on backend, continuing with local state only"
            ),
        }
    })
}

/// Cheap, cloneable access to a running [`Orchestrator`].
#[derive(Clone)]
pub struct TimelineHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<TimelineSnapshot>,
}

impl TimelineHandle {
    /// Starts a run for `prompt`; ignored unless the timeline is idle.
    pub async fn submit(&self, prompt: impl Into<String>, mode: PurchaseMode) -> Result<()> {
        self.send(Event::Submit {
            prompt: prompt.into(),
            mode,
        })
        .await
    }

    /// Switches to another revealed product and pushes it to the backend cart.
    pub async fn select_product(&self, product: Product) -> Result<()> {
        self.send(Event::SelectProduct(product)).await
    }

    /// Moves a manual run on to the credentials step.
    pub async fn proceed(&self) -> Result<()> {
        self.send(Event::Proceed).await
    }

    /// Pays for the current product with `method`.
    pub async fn pay(&self, method: PaymentMethod) -> Result<()> {
        self.send(Event::Pay { method }).await
    }

    /// Abandons the current run, cancelling its timers and calls.
    pub async fn restart(&self) -> Result<()> {
        self.send(Event::Restart).await
    }

    /// State after every command sent through this handle so far has been applied.
    pub async fn snapshot(&self) -> Result<TimelineSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Snapshot(reply))
            .await
            .map_err(|_| TimelineError::Stopped)?;
        rx.await.map_err(|_| TimelineError::Stopped)
    }

    /// Receiver that observes a fresh snapshot after every applied event.
    pub fn subscribe(&self) -> watch::Receiver<TimelineSnapshot> {
        self.snapshots.clone()
    }

    async fn send(&self, event: Event) -> Result<()> {
        self.commands
            .send(Command::Event(event))
            .await
            .map_err(|_| TimelineError::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::step::Step;
    use crate::infrastructure::in_memory::ScriptedBackend;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_observes_submit() {
        let backend = Arc::new(ScriptedBackend::new());
        let handle = Orchestrator::spawn(backend, &Config::default());

        handle
            .submit("coffee machine", PurchaseMode::Manual)
            .await
            .unwrap();
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.step, Step::Shopping);
        assert!(snapshot.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_product_failure_is_swallowed() {
        let backend = Arc::new(ScriptedBackend::new().fail_update_product());
        let handle = Orchestrator::spawn(backend.clone(), &Config::default());

        handle
            .submit("coffee machine", PurchaseMode::Manual)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let snapshot = handle.snapshot().await.unwrap();
        let other = snapshot.alternatives[1].clone();
        handle.select_product(other.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.product, Some(other));
        assert_eq!(snapshot.failure, None);
        assert_eq!(backend.recorded().await.product_updates.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_update_reports_nothing() {
        let backend = Arc::new(ScriptedBackend::new().fail_update_product());
        let task = spawn_detached(backend.clone(), Product::new("x", dec!(1)));
        task.await.unwrap();
        assert_eq!(backend.recorded().await.product_updates.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_reports_stopped_orchestrator() {
        let backend = Arc::new(ScriptedBackend::new());
        let handle = Orchestrator::spawn(backend, &Config::default());
        let (commands, _) = mpsc::channel(1);
        let dead = TimelineHandle {
            commands,
            snapshots: handle.subscribe(),
        };
        assert!(matches!(dead.restart().await, Err(TimelineError::Stopped)));
    }
}
