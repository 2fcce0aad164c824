use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{ProviderError, ProviderResult};
use crate::keys::{parse_ephemeral_key, should_refresh, EphemeralKey};
use crate::listener::KeyUpdateListener;
use crate::operation::{Operation, OperationIdFactory};

/// Where the manager stands with respect to its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyState {
    NoKey,
    /// A key is held. Freshness is re-checked on every request.
    Fresh(EphemeralKey),
    FetchInFlight {
        retrieve: Operation,
        previous: Option<EphemeralKey>,
        pending: Option<Operation>,
    },
}

impl KeyState {
    pub fn kind(&self) -> KeyStateKind {
        match self {
            KeyState::NoKey => KeyStateKind::NoKey,
            KeyState::Fresh(_) => KeyStateKind::KeyFresh,
            KeyState::FetchInFlight { .. } => KeyStateKind::FetchInFlight,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStateKind {
    NoKey,
    KeyFresh,
    FetchInFlight,
}

impl KeyStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStateKind::NoKey => "no_key",
            KeyStateKind::KeyFresh => "key_fresh",
            KeyStateKind::FetchInFlight => "fetch_in_flight",
        }
    }
}

/// Point-in-time view of the manager, for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyStatus {
    pub state: KeyStateKind,
    pub key: Option<EphemeralKey>,
    pub in_flight_operation_id: Option<String>,
    pub pending_operation_id: Option<String>,
}

/// key: ephemeral-key-state-machine
/// Synchronous core of the key manager. Owns the current key and the single pending slot and
/// dispatches every listener callback. It never talks to the provider itself: whenever a fetch
/// is needed it hands back the `RetrieveKey` operation to issue, and the caller reports the
/// outcome through [`complete_fetch`](Self::complete_fetch).
pub struct KeyStateMachine {
    state: KeyState,
    listener: Arc<dyn KeyUpdateListener>,
    id_factory: Arc<dyn OperationIdFactory>,
    clock: Arc<dyn Clock>,
    refresh_buffer_secs: i64,
}

impl KeyStateMachine {
    pub fn new(
        listener: Arc<dyn KeyUpdateListener>,
        id_factory: Arc<dyn OperationIdFactory>,
        clock: Arc<dyn Clock>,
        refresh_buffer_secs: i64,
    ) -> Self {
        Self {
            state: KeyState::NoKey,
            listener,
            id_factory,
            clock,
            refresh_buffer_secs,
        }
    }

    pub fn state(&self) -> &KeyState {
        &self.state
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.state, KeyState::FetchInFlight { .. })
    }

    /// The held key, if one is held and no refresh is running.
    pub fn current_key(&self) -> Option<&EphemeralKey> {
        match &self.state {
            KeyState::Fresh(key) => Some(key),
            _ => None,
        }
    }

    pub fn status(&self) -> KeyStatus {
        let (in_flight_operation_id, pending_operation_id) = match &self.state {
            KeyState::FetchInFlight {
                retrieve, pending, ..
            } => (
                Some(retrieve.id.clone()),
                pending.as_ref().map(|operation| operation.id.clone()),
            ),
            _ => (None, None),
        };
        KeyStatus {
            state: self.state.kind(),
            key: self.current_key().cloned(),
            in_flight_operation_id,
            pending_operation_id,
        }
    }

    /// Runs an internal `RetrieveKey`. Returns the operation to fetch for, if a fetch is needed.
    pub fn prefetch(&mut self) -> Option<Operation> {
        if self.is_fetching() {
            tracing::debug!("prefetch skipped; key fetch already in flight");
            return None;
        }
        let retrieve = Operation::retrieve_key(self.id_factory.create());
        self.request(retrieve)
    }

    /// Executes `operation` against the current key, or parks it behind a fetch.
    ///
    /// Returns the `RetrieveKey` operation when a new fetch must be issued. While a fetch is
    /// already running the operation replaces whatever was pending and nothing is returned.
    pub fn request(&mut self, operation: Operation) -> Option<Operation> {
        if let KeyState::Fresh(key) = &self.state {
            let now = self.clock.now_millis();
            if !should_refresh(Some(key), now, self.refresh_buffer_secs) {
                tracing::debug!(
                    operation_id = %operation.id,
                    kind = operation.kind.name(),
                    key_id = %key.id,
                    "ephemeral key fresh; executing operation"
                );
                self.listener.on_key_update(key, &operation);
                return None;
            }
        }

        match std::mem::replace(&mut self.state, KeyState::NoKey) {
            KeyState::FetchInFlight {
                retrieve,
                previous,
                pending,
            } => {
                if let Some(superseded) = pending {
                    tracing::warn!(
                        operation_id = %superseded.id,
                        kind = superseded.kind.name(),
                        replacement_id = %operation.id,
                        "pending operation superseded while key fetch in flight"
                    );
                }
                tracing::debug!(
                    operation_id = %operation.id,
                    retrieve_id = %retrieve.id,
                    "queued operation behind in-flight key fetch"
                );
                self.state = KeyState::FetchInFlight {
                    retrieve,
                    previous,
                    pending: Some(operation),
                };
                None
            }
            state => {
                let previous = match state {
                    KeyState::Fresh(key) => Some(key),
                    _ => None,
                };
                let (retrieve, pending) = if operation.is_retrieve_key() {
                    (operation, None)
                } else {
                    let retrieve = Operation::retrieve_key(self.id_factory.create());
                    (retrieve, Some(operation))
                };
                tracing::debug!(
                    retrieve_id = %retrieve.id,
                    pending_id = pending.as_ref().map(|operation| operation.id.as_str()),
                    had_key = previous.is_some(),
                    "ephemeral key stale or missing; fetching"
                );
                self.state = KeyState::FetchInFlight {
                    retrieve: retrieve.clone(),
                    previous,
                    pending,
                };
                Some(retrieve)
            }
        }
    }

    /// Applies the outcome of the in-flight fetch.
    ///
    /// A successful body that fails to parse is reported like a provider error with
    /// [`INTERNAL_ERROR_CODE`](crate::INTERNAL_ERROR_CODE). Any error discards the key and
    /// drops the pending operation without a callback.
    pub fn complete_fetch(&mut self, outcome: ProviderResult) {
        let (retrieve, pending) = match std::mem::replace(&mut self.state, KeyState::NoKey) {
            KeyState::FetchInFlight {
                retrieve, pending, ..
            } => (retrieve, pending),
            other => {
                tracing::warn!(
                    state = other.kind().as_str(),
                    "key fetch outcome arrived with no fetch in flight; ignoring"
                );
                self.state = other;
                return;
            }
        };

        let parsed = outcome
            .and_then(|raw| parse_ephemeral_key(&raw).map_err(ProviderError::from));

        match parsed {
            Ok(key) => {
                tracing::info!(
                    retrieve_id = %retrieve.id,
                    key_id = %key.id,
                    fingerprint = %key.fingerprint(),
                    expires = key.expires,
                    "installed ephemeral key"
                );
                self.state = KeyState::Fresh(key.clone());
                self.listener.on_key_update(&key, &retrieve);
                if let Some(pending) = pending {
                    self.listener.on_key_update(&key, &pending);
                }
            }
            Err(err) => {
                tracing::warn!(
                    retrieve_id = %retrieve.id,
                    code = err.code,
                    message = %err.message,
                    "ephemeral key fetch failed; key discarded"
                );
                self.listener
                    .on_key_error(&retrieve.id, err.code, &err.message);
                if let Some(dropped) = pending {
                    tracing::warn!(
                        operation_id = %dropped.id,
                        kind = dropped.kind.name(),
                        "dropping pending operation after failed key fetch"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::INTERNAL_ERROR_CODE;
    use crate::operation::OperationKind;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Update { key_id: String, operation_id: String },
        Error { operation_id: String, code: i32, message: String },
    }

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingListener {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl KeyUpdateListener for RecordingListener {
        fn on_key_update(&self, key: &EphemeralKey, operation: &Operation) {
            self.calls.lock().unwrap().push(Call::Update {
                key_id: key.id.clone(),
                operation_id: operation.id.clone(),
            });
        }

        fn on_key_error(&self, operation_id: &str, code: i32, message: &str) {
            self.calls.lock().unwrap().push(Call::Error {
                operation_id: operation_id.to_string(),
                code,
                message: message.to_string(),
            });
        }
    }

    #[derive(Default)]
    struct CountingIds {
        count: AtomicUsize,
    }

    impl OperationIdFactory for CountingIds {
        fn create(&self) -> String {
            let n = self.count.fetch_add(1, Ordering::SeqCst);
            format!("retrieve-{n}")
        }
    }

    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    const EXPIRES: i64 = 1_700_000_000;

    fn key_body(id: &str) -> String {
        format!(r#"{{"id": "{id}", "expires": {EXPIRES}, "secret": "ek_test_{id}"}}"#)
    }

    fn delete_source(id: &str) -> Operation {
        Operation::new(
            id,
            OperationKind::DeleteSource {
                source_id: "src_1".into(),
            },
        )
    }

    struct Harness {
        machine: KeyStateMachine,
        listener: Arc<RecordingListener>,
        ids: Arc<CountingIds>,
        clock: Arc<FixedClock>,
    }

    fn harness() -> Harness {
        let listener = Arc::new(RecordingListener::default());
        let ids = Arc::new(CountingIds::default());
        let clock = Arc::new(FixedClock(AtomicI64::new((EXPIRES - 60) * 1000)));
        let machine = KeyStateMachine::new(listener.clone(), ids.clone(), clock.clone(), 10);
        Harness {
            machine,
            listener,
            ids,
            clock,
        }
    }

    #[test]
    fn first_request_triggers_fetch_and_queues_operation() {
        let mut h = harness();
        let retrieve = h.machine.request(delete_source("op-1")).unwrap();

        assert!(retrieve.is_retrieve_key());
        assert_eq!(retrieve.id, "retrieve-0");
        assert_eq!(h.ids.count.load(Ordering::SeqCst), 1);
        let status = h.machine.status();
        assert_eq!(status.state, KeyStateKind::FetchInFlight);
        assert_eq!(status.pending_operation_id.as_deref(), Some("op-1"));
        assert!(h.listener.calls().is_empty());
    }

    #[test]
    fn successful_fetch_notifies_retrieve_then_pending() {
        let mut h = harness();
        h.machine.request(delete_source("op-1"));
        h.machine.complete_fetch(Ok(key_body("ephkey_1")));

        assert_eq!(
            h.listener.calls(),
            vec![
                Call::Update {
                    key_id: "ephkey_1".into(),
                    operation_id: "retrieve-0".into()
                },
                Call::Update {
                    key_id: "ephkey_1".into(),
                    operation_id: "op-1".into()
                },
            ]
        );
        assert_eq!(h.machine.state().kind(), KeyStateKind::KeyFresh);
        assert_eq!(h.machine.current_key().map(|key| key.id.as_str()), Some("ephkey_1"));
    }

    #[test]
    fn failed_fetch_drops_pending_and_clears_key() {
        let mut h = harness();
        h.machine.request(delete_source("op-1"));
        h.machine.complete_fetch(Err(ProviderError::new(404, "boom")));

        assert_eq!(
            h.listener.calls(),
            vec![Call::Error {
                operation_id: "retrieve-0".into(),
                code: 404,
                message: "boom".into()
            }]
        );
        assert_eq!(h.machine.state(), &KeyState::NoKey);
    }

    #[test]
    fn error_discards_previously_held_key() {
        let mut h = harness();
        h.machine.prefetch();
        h.machine.complete_fetch(Ok(key_body("ephkey_1")));
        h.clock.0.store(EXPIRES * 1000, Ordering::SeqCst);

        assert!(h.machine.request(delete_source("op-1")).is_some());
        h.machine.complete_fetch(Err(ProviderError::new(503, "down")));

        assert_eq!(h.machine.state(), &KeyState::NoKey);
        assert!(h.machine.current_key().is_none());
    }

    #[test]
    fn fresh_key_executes_immediately_without_fetch() {
        let mut h = harness();
        h.machine.prefetch();
        h.machine.complete_fetch(Ok(key_body("ephkey_1")));
        let ids_before = h.ids.count.load(Ordering::SeqCst);

        assert!(h.machine.request(delete_source("op-1")).is_none());
        assert!(h.machine.request(delete_source("op-2")).is_none());

        assert_eq!(h.ids.count.load(Ordering::SeqCst), ids_before);
        let calls = h.listener.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1..],
            [
                Call::Update {
                    key_id: "ephkey_1".into(),
                    operation_id: "op-1".into()
                },
                Call::Update {
                    key_id: "ephkey_1".into(),
                    operation_id: "op-2".into()
                },
            ]
        );
    }

    #[test]
    fn stale_key_within_buffer_triggers_refresh() {
        let mut h = harness();
        h.machine.prefetch();
        h.machine.complete_fetch(Ok(key_body("ephkey_1")));
        h.clock.0.store((EXPIRES + 5) * 1000, Ordering::SeqCst);

        let retrieve = h.machine.request(delete_source("op-1"));
        assert!(retrieve.is_some());
        assert!(matches!(
            h.machine.state(),
            KeyState::FetchInFlight { previous: Some(_), .. }
        ));
    }

    #[test]
    fn in_flight_fetch_keeps_only_latest_pending() {
        let mut h = harness();
        assert!(h.machine.request(delete_source("op-1")).is_some());
        assert!(h.machine.request(delete_source("op-2")).is_none());
        assert!(h.machine.request(delete_source("op-3")).is_none());
        assert_eq!(h.ids.count.load(Ordering::SeqCst), 1);

        h.machine.complete_fetch(Ok(key_body("ephkey_1")));
        let operation_ids: Vec<String> = h
            .listener
            .calls()
            .into_iter()
            .map(|call| match call {
                Call::Update { operation_id, .. } => operation_id,
                Call::Error { operation_id, .. } => operation_id,
            })
            .collect();
        assert_eq!(operation_ids, vec!["retrieve-0", "op-3"]);
    }

    #[test]
    fn unparseable_body_is_internal_error() {
        let mut h = harness();
        h.machine.request(delete_source("op-1"));
        h.machine.complete_fetch(Ok("Not_a_JSON".into()));

        match h.listener.calls().as_slice() {
            [Call::Error {
                operation_id,
                code,
                message,
            }] => {
                assert_eq!(operation_id, "retrieve-0");
                assert_eq!(*code, INTERNAL_ERROR_CODE);
                assert!(message.contains("cannot be converted"));
            }
            other => panic!("unexpected calls: {other:?}"),
        }
    }

    #[test]
    fn caller_retrieve_key_becomes_the_fetch() {
        let mut h = harness();
        let retrieve = h.machine.request(Operation::retrieve_key("mine")).unwrap();
        assert_eq!(retrieve.id, "mine");
        assert_eq!(h.ids.count.load(Ordering::SeqCst), 0);

        h.machine.complete_fetch(Ok(key_body("ephkey_1")));
        assert_eq!(
            h.listener.calls(),
            vec![Call::Update {
                key_id: "ephkey_1".into(),
                operation_id: "mine".into()
            }]
        );
    }

    #[test]
    fn prefetch_is_skipped_while_fetching() {
        let mut h = harness();
        assert!(h.machine.prefetch().is_some());
        assert!(h.machine.prefetch().is_none());
        assert_eq!(h.ids.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stray_outcome_is_ignored() {
        let mut h = harness();
        h.machine.complete_fetch(Ok(key_body("ephkey_1")));
        assert_eq!(h.machine.state(), &KeyState::NoKey);
        assert!(h.listener.calls().is_empty());
    }
}
