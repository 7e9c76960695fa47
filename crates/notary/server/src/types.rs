use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use eyre::eyre;
use tlsproof_core::CryptoProvider;
use tokio::sync::Semaphore;

use crate::{config::NotarizationProperties, error::NotaryServerError};

/// Data limits a prover asked for when it opened a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_sent_data: usize,
    pub max_recv_data: usize,
}

/// Global data that needs to be shared with the axum handlers
#[derive(Clone)]
pub struct NotaryGlobals {
    pub crypto_provider: Arc<CryptoProvider>,
    pub notarization_config: NotarizationProperties,
    /// Sessions opened with /session and not yet used by /notarize
    pub store: Arc<Mutex<HashMap<String, SessionLimits>>>,
    /// A semaphore to acquire a permit for notarization
    pub semaphore: Arc<Semaphore>,
    /// Seconds a client is asked to wait when no permit is left
    pub retry_after: u64,
}

impl NotaryGlobals {
    pub fn new(
        crypto_provider: Arc<CryptoProvider>,
        notarization_config: NotarizationProperties,
        semaphore: Arc<Semaphore>,
        retry_after: u64,
    ) -> Self {
        Self {
            crypto_provider,
            notarization_config,
            store: Default::default(),
            semaphore,
            retry_after,
        }
    }

    /// Registers a new session.
    pub fn insert_session(
        &self,
        session_id: String,
        limits: SessionLimits,
    ) -> Result<(), NotaryServerError> {
        self.store
            .lock()
            .map_err(|_| eyre!("session store lock poisoned"))?
            .insert(session_id, limits);

        Ok(())
    }

    /// Removes a session, returning its limits if it existed. Each session id
    /// can be used once.
    pub fn take_session(&self, session_id: &str) -> Result<Option<SessionLimits>, NotaryServerError> {
        Ok(self
            .store
            .lock()
            .map_err(|_| eyre!("session store lock poisoned"))?
            .remove(session_id))
    }
}
