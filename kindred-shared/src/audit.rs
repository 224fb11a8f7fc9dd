//! Fire-and-forget audit trail
//!
//! [`AuditLogger::record`] never fails and never waits: events go onto an
//! unbounded channel and a background writer persists them. A write that
//! fails is logged at `warn` and dropped; request handling never sees it.
//!
//! # Example
//!
//! ```no_run
//! use kindred_shared::audit::{AuditEvent, AuditLogger};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(pool: sqlx::PgPool) {
//! let shutdown = CancellationToken::new();
//! let (audit, writer) = AuditLogger::spawn(pool, shutdown.clone());
//!
//! audit.record(AuditEvent::new("user.login").with_subject("user", "42"));
//!
//! shutdown.cancel();
//! let _ = writer.await;
//! # }
//! ```

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::audit_log::{AuditLog, CreateAuditLog};

/// One auditable action
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            actor_id: None,
            subject_type: None,
            subject_id: None,
            metadata: JsonValue::Object(Default::default()),
            ip_address: None,
        }
    }

    pub fn with_actor(mut self, actor_id: Option<Uuid>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_subject(mut self, subject_type: &str, subject_id: impl ToString) -> Self {
        self.subject_type = Some(subject_type.to_string());
        self.subject_id = Some(subject_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

impl From<AuditEvent> for CreateAuditLog {
    fn from(event: AuditEvent) -> Self {
        CreateAuditLog {
            action: event.action,
            actor_id: event.actor_id,
            subject_type: event.subject_type,
            subject_id: event.subject_id,
            metadata: event.metadata,
            ip_address: event.ip_address,
        }
    }
}

/// Where the writer persists events
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn write(&self, event: AuditEvent) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl AuditSink for PgPool {
    async fn write(&self, event: AuditEvent) -> Result<(), sqlx::Error> {
        AuditLog::create(self, event.into()).await.map(|_| ())
    }
}

/// Cheap-to-clone handle for recording events
#[derive(Clone, Debug)]
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl AuditLogger {
    /// Starts a writer persisting to `sink` until `shutdown` fires
    pub fn spawn<S: AuditSink>(sink: S, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_writer(sink, rx, shutdown));
        (Self { tx }, handle)
    }

    /// A logger whose events go nowhere
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    pub fn record(&self, event: AuditEvent) {
        if self.tx.send(event).is_err() {
            debug!("Audit writer stopped, dropping event");
        }
    }
}

async fn write_one<S: AuditSink>(sink: &S, event: AuditEvent) {
    let action = event.action.clone();
    if let Err(e) = sink.write(event).await {
        warn!(action = %action, error = %e, "Failed to write audit log");
    }
}

async fn run_writer<S: AuditSink>(
    sink: S,
    mut rx: mpsc::UnboundedReceiver<AuditEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => write_one(&sink, event).await,
                None => return,
            },
        }
    }

    // Flush what was queued before shutdown
    rx.close();
    let mut drained = 0usize;
    while let Some(event) = rx.recv().await {
        write_one(&sink, event).await;
        drained += 1;
    }

    info!(drained, "Audit writer stopped");
}
