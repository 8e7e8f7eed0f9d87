//! Exactly-once establishment of the server-side push session.
//!
//! Sockets must not open before the gateway has set up the push session.
//! [`InitGate::ensure_initialized`] is idempotent once the session token is
//! set. While a request is outstanding every caller awaits the same shared
//! future, so concurrent mounts never issue a second init call.

use crate::error::InitError;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use gateway_client::GatewayClient;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// Remote call that establishes the push session.
pub trait SessionInitializer: Send + Sync + 'static {
    /// Issues one init request.
    fn initialize(&self) -> BoxFuture<'static, Result<(), InitError>>;
}

impl SessionInitializer for GatewayClient {
    fn initialize(&self) -> BoxFuture<'static, Result<(), InitError>> {
        let client = self.clone();
        async move {
            let response = client.init_stream_session().await?;
            debug!(message = ?response.message, "Gateway accepted stream session init");
            Ok(())
        }
        .boxed()
    }
}

type SharedInit = Shared<BoxFuture<'static, Result<(), InitError>>>;

struct InFlight {
    request: u64,
    epoch: u64,
    future: SharedInit,
}

/// Process-wide init token plus single-flight init request.
pub struct InitGate {
    initializer: Arc<dyn SessionInitializer>,
    token: AtomicBool,
    in_flight: Mutex<Option<InFlight>>,
    /// Bumped by [`InitGate::clear`]; outcomes from older epochs are ignored.
    epoch: AtomicU64,
    requests: AtomicU64,
}

impl InitGate {
    /// Creates a gate around an initializer.
    #[must_use]
    pub fn new(initializer: Arc<dyn SessionInitializer>) -> Self {
        Self {
            initializer,
            token: AtomicBool::new(false),
            in_flight: Mutex::new(None),
            epoch: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        }
    }

    /// Whether the push session is established.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.token.load(Ordering::Acquire)
    }

    /// Whether an init request is outstanding.
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// Number of init requests issued so far.
    #[must_use]
    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::Acquire)
    }

    /// Ensures the push session exists, issuing at most one request at a time.
    ///
    /// # Errors
    /// Returns the shared [`InitError`] when the in-flight request fails, or
    /// [`InitError::Reset`] when [`clear`](Self::clear) ran while it was in
    /// flight. The token stays unset, so a later call issues a fresh request.
    pub async fn ensure_initialized(&self) -> Result<(), InitError> {
        if self.is_initialized() {
            return Ok(());
        }

        let (request, epoch, future) = {
            let mut slot = self.in_flight.lock();
            if self.is_initialized() {
                return Ok(());
            }
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(request = in_flight.request, "Joining in-flight session init");
                    (in_flight.request, in_flight.epoch, in_flight.future.clone())
                }
                None => {
                    let request = self.requests.fetch_add(1, Ordering::AcqRel) + 1;
                    let epoch = self.epoch.load(Ordering::Acquire);
                    info!(request, "Issuing stream session init request");
                    let future = self.initializer.initialize().shared();
                    *slot = Some(InFlight {
                        request,
                        epoch,
                        future: future.clone(),
                    });
                    (request, epoch, future)
                }
            }
        };

        let outcome = future.await;

        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|f| f.request == request) {
            *slot = None;
        }
        if epoch != self.epoch.load(Ordering::Acquire) {
            debug!(request, "Discarding init outcome from before a reset");
            return Err(InitError::Reset);
        }
        match &outcome {
            Ok(()) => {
                if !self.token.swap(true, Ordering::AcqRel) {
                    info!(request, "Stream session established");
                }
            }
            Err(err) => warn!(request, error = %err, "Stream session init failed"),
        }
        outcome
    }

    /// Forgets the session: logout or backend restart.
    pub fn clear(&self) {
        let mut slot = self.in_flight.lock();
        self.epoch.fetch_add(1, Ordering::AcqRel);
        *slot = None;
        if self.token.swap(false, Ordering::AcqRel) {
            info!("Stream session token cleared");
        }
    }
}

impl std::fmt::Debug for InitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitGate")
            .field("initialized", &self.is_initialized())
            .field("requests", &self.requests_issued())
            .finish()
    }
}
