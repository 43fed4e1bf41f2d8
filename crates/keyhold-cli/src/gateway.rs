//! Asynchronous boundary between the interactive front end and the store.
//!
//! The front end hands an [`AuthRequest`] to [`AuthGateway::submit`] and
//! keeps going; the store call runs as a background task and the result
//! comes back as an [`AuthEvent`] on the gateway's channel. Store errors are
//! turned into [`AuthOutcome::StorageFailed`] so the front end never has to
//! deal with a panic or a hung call.

use keyhold_store::{CredentialStore, StoreResult};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::form::Credentials;

/// Work the front end can ask for.
#[derive(Debug, Clone)]
pub enum AuthRequest {
    Register(Credentials),
    Login(Credentials),
}

/// How a request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Registered,
    IdentifierTaken,
    Authenticated,
    /// Unknown identifier or wrong secret; deliberately not told apart.
    InvalidCredentials,
    /// The store failed; carries the error text for logs.
    StorageFailed(String),
}

impl AuthOutcome {
    /// Whether the request achieved what it asked for.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Registered | Self::Authenticated)
    }
}

/// A finished request, tagged with the id returned by [`AuthGateway::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub request_id: u64,
    pub outcome: AuthOutcome,
}

/// Runs store calls off the interaction path and reports back over a channel.
pub struct AuthGateway {
    store: CredentialStore,
    runtime: Handle,
    tasks: JoinSet<()>,
    next_id: u64,
    /// Sender cloned into spawned request tasks.
    event_tx: mpsc::UnboundedSender<AuthEvent>,
    /// Receiver for events from background request tasks.
    event_rx: mpsc::UnboundedReceiver<AuthEvent>,
}

impl AuthGateway {
    /// Create a gateway over `store`.
    ///
    /// Must be called from within a tokio runtime; later calls to
    /// [`submit`](Self::submit) may come from any thread.
    pub fn new(store: CredentialStore) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            store,
            runtime: Handle::current(),
            tasks: JoinSet::new(),
            next_id: 1,
            event_tx,
            event_rx,
        }
    }

    /// Start `request` in the background and return its id.
    pub fn submit(&mut self, request: AuthRequest) -> u64 {
        let request_id = self.next_id;
        self.next_id += 1;

        let store = self.store.clone();
        let tx = self.event_tx.clone();
        self.tasks.spawn_on(
            async move {
                let outcome = perform(&store, request).await;
                // Release the connection before reporting so the receiver
                // can close the store straight away.
                drop(store);
                if tx.send(AuthEvent { request_id, outcome }).is_err() {
                    debug!(request_id, "gateway gone, dropping result");
                }
            },
            &self.runtime,
        );

        debug!(request_id, "request submitted");
        request_id
    }

    /// Wait for the next finished request.
    ///
    /// Returns `None` only if nothing is in flight and no result is queued.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            if let Ok(event) = self.event_rx.try_recv() {
                return Some(event);
            }
            if self.tasks.is_empty() {
                return None;
            }

            // A task that died without reporting must not leave us waiting
            // on the channel forever.
            tokio::select! {
                Some(event) = self.event_rx.recv() => return Some(event),
                Some(joined) = self.tasks.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "request task failed");
                    }
                }
            }
        }
    }

    /// Wait for in-flight requests, then close the store.
    pub async fn shutdown(mut self) -> StoreResult<()> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "request task failed");
            }
        }
        self.store.close()
    }
}

async fn perform(store: &CredentialStore, request: AuthRequest) -> AuthOutcome {
    let result = match &request {
        AuthRequest::Register(creds) => store
            .register(creds.identifier(), creds.secret())
            .await
            .map(|created| {
                if created {
                    AuthOutcome::Registered
                } else {
                    AuthOutcome::IdentifierTaken
                }
            }),
        AuthRequest::Login(creds) => store
            .verify(creds.identifier(), creds.secret())
            .await
            .map(|ok| {
                if ok {
                    AuthOutcome::Authenticated
                } else {
                    AuthOutcome::InvalidCredentials
                }
            }),
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "store request failed");
        AuthOutcome::StorageFailed(e.to_string())
    })
}
