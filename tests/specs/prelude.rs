//! Shared fixtures for the behavioral specs.

use pal_core::{FixedClock, PalConfig, SequentialIdGen, SessionId, SessionKind, WorkerSession};
use pal_engine::sessions::{SessionManager, StartSession};
use pal_engine::{Executor, MessageBus, PortManager, SendSpec};
use pal_storage::{queries, Store};

pub struct World {
    pub store: Store,
    pub clock: FixedClock,
    pub ids: SequentialIdGen,
    pub config: PalConfig,
    pub project: tempfile::TempDir,
}

impl World {
    /// A fresh project directory with a real single-file store inside it.
    pub fn new() -> Self {
        let project = tempfile::tempdir().unwrap();
        let store = Store::open(&project.path().join(".pal").join("pal.db")).unwrap();
        Self {
            store,
            clock: FixedClock::new(1_700_000_000_000),
            ids: SequentialIdGen::new("id"),
            config: PalConfig::default(),
            project,
        }
    }

    pub fn sessions(&self) -> SessionManager<'_> {
        SessionManager::new(&self.store, &self.clock, &self.ids)
    }

    pub fn ports(&self) -> PortManager<'_> {
        PortManager::new(&self.store, &self.clock)
    }

    pub fn executor(&self) -> Executor<'_> {
        Executor::new(&self.store, &self.clock, &self.ids, &self.config)
    }

    pub fn bus(&self) -> MessageBus<'_> {
        MessageBus::new(&self.store, &self.clock)
    }

    pub fn operator(&self) -> SessionId {
        self.sessions()
            .start(StartSession {
                kind: Some(SessionKind::Operator),
                project_root: Some(self.project.path().to_owned()),
                ..StartSession::default()
            })
            .unwrap()
            .id
    }

    pub fn active_worker(&self, port: &str) -> WorkerSession {
        self.store
            .with_conn(|conn| Ok(queries::workers::active_for_port(conn, port)?))
            .unwrap()
            .unwrap_or_else(|| panic!("no active worker for port {port}"))
    }

    /// Deliver a worker-emitted message through the bus and the executor,
    /// the way the hook layer would.
    pub fn worker_says(
        &self,
        executor: &Executor<'_>,
        from: &SessionId,
        to: &SessionId,
        subtype: pal_core::MessageSubtype,
        payload: serde_json::Value,
    ) {
        let bus = self.bus();
        let spec = SendSpec {
            from_session: from.clone(),
            to_session: to.clone(),
            message_type: pal_core::MessageType::Report,
            subtype,
            port_id: None,
            payload,
            token_count: None,
            conversation_id: None,
        };
        let id = bus.send(&spec).unwrap();
        let msg = bus.get(id).unwrap();
        executor.handle_message(&msg).unwrap();
    }
}
