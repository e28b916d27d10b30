use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{Context, Result};
use core_types::{
    DispatchError, Envelope, GatewayFactory, OperationEvent, OperationFailure, OperationId,
    OperationKind, OperationRequest, ProgressEvent,
};
use futures::FutureExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use crate::ops::{OperationSettings, execute};

/// Runs a worker job off the caller's thread.
pub trait Spawner: Send + Sync {
    fn spawn(&self, name: String, job: BoxFuture<'static, ()>) -> Result<()>;
}

/// One named OS thread per operation, each with its own current-thread
/// runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: String, job: BoxFuture<'static, ()>) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build worker runtime")?;
        std::thread::Builder::new()
            .name(name)
            .spawn(move || runtime.block_on(job))
            .context("failed to spawn worker thread")?;
        Ok(())
    }
}

/// Sends one operation's events back to the shell.
struct EventSink {
    id: OperationId,
    kind: OperationKind,
    sender: UnboundedSender<Envelope>,
}

impl EventSink {
    fn send(&self, event: OperationEvent) {
        let envelope = Envelope {
            id: self.id,
            kind: self.kind,
            event,
        };
        if self.sender.unbounded_send(envelope).is_err() {
            debug!(kind = %self.kind, operation_id = self.id, "shell gone; event dropped");
        }
    }

    fn progress(&self, event: ProgressEvent) {
        self.send(OperationEvent::Progress(event));
    }
}

/// Starts operations and tracks which one is current for each kind.
///
/// Each kind runs at most one operation at a time. Envelopes from an
/// operation that is no longer current are rejected by [`Dispatcher::accept`].
pub struct Dispatcher {
    factory: Arc<dyn GatewayFactory>,
    settings: Arc<OperationSettings>,
    spawner: Arc<dyn Spawner>,
    sender: UnboundedSender<Envelope>,
    running: HashMap<OperationKind, OperationId>,
    next_id: OperationId,
}

impl Dispatcher {
    pub fn new(
        factory: Arc<dyn GatewayFactory>,
        settings: OperationSettings,
        spawner: Arc<dyn Spawner>,
    ) -> (Self, UnboundedReceiver<Envelope>) {
        let (sender, receiver) = unbounded();
        let dispatcher = Self {
            factory,
            settings: Arc::new(settings),
            spawner,
            sender,
            running: HashMap::new(),
            next_id: 0,
        };
        (dispatcher, receiver)
    }

    pub fn start(&mut self, request: OperationRequest) -> Result<OperationId, DispatchError> {
        if let Some(field) = request.missing_field() {
            return Err(DispatchError::MissingInput(field));
        }
        let kind = request.kind();
        if self.running.contains_key(&kind) {
            return Err(DispatchError::AlreadyRunning(kind));
        }

        self.next_id += 1;
        let id = self.next_id;
        let sink = EventSink {
            id,
            kind,
            sender: self.sender.clone(),
        };
        let job = run_operation(self.factory.clone(), self.settings.clone(), request, sink).boxed();

        self.running.insert(kind, id);
        if let Err(err) = self.spawner.spawn(format!("lectern-{kind}-{id}"), job) {
            self.running.remove(&kind);
            warn!(kind = %kind, error = %err, "failed to start worker");
            return Err(DispatchError::SpawnFailed(format!("{err:#}")));
        }
        info!(kind = %kind, operation_id = id, "operation started");
        Ok(id)
    }

    /// Returns false for envelopes that do not belong to the current
    /// operation of their kind. A terminal envelope returns its kind to idle.
    pub fn accept(&mut self, envelope: &Envelope) -> bool {
        if self.running.get(&envelope.kind) != Some(&envelope.id) {
            debug!(
                kind = %envelope.kind,
                operation_id = envelope.id,
                "dropping stale operation event"
            );
            return false;
        }
        if envelope.event.is_terminal() {
            self.running.remove(&envelope.kind);
        }
        true
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.running.contains_key(&kind)
    }

    pub fn running_kinds(&self) -> Vec<OperationKind> {
        OperationKind::ALL
            .into_iter()
            .filter(|kind| self.is_running(*kind))
            .collect()
    }
}

/// Always ends with exactly one terminal event, even when the job panics.
async fn run_operation(
    factory: Arc<dyn GatewayFactory>,
    settings: Arc<OperationSettings>,
    request: OperationRequest,
    sink: EventSink,
) {
    let kind = request.kind();
    let job = execute(factory.as_ref(), &settings, request, |event| sink.progress(event));
    let event = match AssertUnwindSafe(job).catch_unwind().await {
        Ok(Ok(outcome)) => {
            info!(kind = %kind, operation_id = sink.id, "operation completed");
            OperationEvent::Completed(outcome)
        }
        Ok(Err(err)) => {
            let failure = OperationFailure::classify(&err);
            warn!(kind = %kind, operation_id = sink.id, error = %failure, "operation failed");
            if let OperationFailure::Unexpected { trace, .. } = &failure {
                debug!(kind = %kind, %trace, "failure trace");
            }
            OperationEvent::Failed(failure)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(kind = %kind, operation_id = sink.id, %message, "operation panicked");
            OperationEvent::Failed(OperationFailure::Unexpected {
                trace: format!("worker panicked: {message}"),
                message,
            })
        }
    };
    sink.send(event);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "worker panicked".to_string()
    }
}
