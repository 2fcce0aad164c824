use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};

use crate::clock::{Clock, SystemClock};
use crate::config::KeyManagerConfig;
use crate::error::{ProviderError, ProviderResult, INTERNAL_ERROR_CODE};
use crate::listener::KeyUpdateListener;
use crate::operation::{Operation, OperationIdFactory, OperationKind};
use crate::provider::KeyProvider;

mod state;

pub use state::{KeyState, KeyStateKind, KeyStateMachine, KeyStatus};

const SHUT_DOWN_MESSAGE: &str = "ephemeral key manager is shut down";

enum Command {
    Retrieve(Operation),
    Prefetch,
    Status(oneshot::Sender<KeyStatus>),
}

/// key: ephemeral-key-manager
/// Handle to a worker task that owns a [`KeyStateMachine`]. Requests are serialized through a
/// channel and provider fetches run as tasks whose outcomes are fed back to the worker, so the
/// key and the pending slot are only ever touched by one task. Results arrive exclusively
/// through the [`KeyUpdateListener`].
///
/// Must be created inside a tokio runtime. The worker stops once every handle is dropped and
/// any outstanding fetch has been delivered.
#[derive(Clone)]
pub struct EphemeralKeyManager {
    commands: mpsc::Sender<Command>,
    listener: Arc<dyn KeyUpdateListener>,
    id_factory: Arc<dyn OperationIdFactory>,
}

impl EphemeralKeyManager {
    pub fn new(
        provider: Arc<dyn KeyProvider>,
        listener: Arc<dyn KeyUpdateListener>,
        config: KeyManagerConfig,
        id_factory: Arc<dyn OperationIdFactory>,
    ) -> Self {
        Self::with_clock(provider, listener, config, id_factory, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn KeyProvider>,
        listener: Arc<dyn KeyUpdateListener>,
        config: KeyManagerConfig,
        id_factory: Arc<dyn OperationIdFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let mut machine = KeyStateMachine::new(
            listener.clone(),
            id_factory.clone(),
            clock,
            config.refresh_buffer_secs,
        );
        let initial = if config.should_prefetch {
            machine.prefetch()
        } else {
            None
        };

        let worker = KeyWorker {
            machine,
            provider,
            api_version: config.api_version,
            fetches: JoinSet::new(),
        };
        tokio::spawn(worker.run(rx, initial));

        Self {
            commands: tx,
            listener,
            id_factory,
        }
    }

    /// Runs `operation` once a fresh key is available. The outcome is delivered to the listener.
    pub async fn retrieve_ephemeral_key(&self, operation: Operation) {
        if let Err(mpsc::error::SendError(Command::Retrieve(operation))) =
            self.commands.send(Command::Retrieve(operation)).await
        {
            tracing::error!(operation_id = %operation.id, "key manager worker is gone");
            self.listener
                .on_key_error(&operation.id, INTERNAL_ERROR_CODE, SHUT_DOWN_MESSAGE);
        }
    }

    /// Like [`retrieve_ephemeral_key`](Self::retrieve_ephemeral_key) with a factory-assigned id,
    /// which is returned for correlation.
    pub async fn perform(&self, kind: OperationKind) -> String {
        let operation = Operation::new(self.id_factory.create(), kind);
        let id = operation.id.clone();
        self.retrieve_ephemeral_key(operation).await;
        id
    }

    /// Fetches a key ahead of demand unless one is already being fetched.
    pub async fn prefetch(&self) {
        if self.commands.send(Command::Prefetch).await.is_err() {
            tracing::warn!("prefetch requested after key manager shut down");
        }
    }

    /// Snapshot of the worker state, or `None` once the worker has stopped.
    pub async fn status(&self) -> Option<KeyStatus> {
        let (reply, response) = oneshot::channel();
        self.commands.send(Command::Status(reply)).await.ok()?;
        response.await.ok()
    }
}

struct KeyWorker {
    machine: KeyStateMachine,
    provider: Arc<dyn KeyProvider>,
    api_version: String,
    fetches: JoinSet<ProviderResult>,
}

impl KeyWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, initial: Option<Operation>) {
        if let Some(retrieve) = initial {
            self.spawn_fetch(retrieve);
        }

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(joined) = self.fetches.join_next(), if !self.fetches.is_empty() => {
                    self.complete(joined);
                }
            }
        }

        // Outstanding fetches still owe their callbacks.
        while let Some(joined) = self.fetches.join_next().await {
            self.complete(joined);
        }
        tracing::debug!("ephemeral key manager worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Retrieve(operation) => {
                if let Some(retrieve) = self.machine.request(operation) {
                    self.spawn_fetch(retrieve);
                }
            }
            Command::Prefetch => {
                if let Some(retrieve) = self.machine.prefetch() {
                    self.spawn_fetch(retrieve);
                }
            }
            Command::Status(reply) => {
                let _ = reply.send(self.machine.status());
            }
        }
    }

    fn spawn_fetch(&mut self, retrieve: Operation) {
        tracing::debug!(
            retrieve_id = %retrieve.id,
            api_version = %self.api_version,
            "requesting ephemeral key from provider"
        );
        let provider = self.provider.clone();
        let api_version = self.api_version.clone();
        self.fetches
            .spawn(async move { provider.create_ephemeral_key(&api_version).await });
    }

    fn complete(&mut self, joined: Result<ProviderResult, JoinError>) {
        let outcome = joined.unwrap_or_else(|err| {
            tracing::error!(?err, "key provider task failed");
            Err(ProviderError::internal(format!(
                "key provider task failed: {err}"
            )))
        });
        self.machine.complete_fetch(outcome);
    }
}
