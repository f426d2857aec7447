//! In-memory session store
//!
//! Sessions live only for the lifetime of the process. Each one sits behind its
//! own mutex, so requests against a single session run one at a time while
//! different sessions proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::PromptTemplate;
use crate::providers::LanguageModel;
use crate::speech::SpeechSynthesizer;

use super::session::{FailurePolicy, Session, DEFAULT_LANGUAGE};

pub type SessionHandle = Arc<Mutex<Session>>;

/// Builds sessions wired to the configured collaborators
#[derive(Clone)]
pub struct SessionFactory {
    template: Arc<PromptTemplate>,
    model: Option<Arc<dyn LanguageModel>>,
    not_configured: Option<String>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    language: String,
    failure_policy: FailurePolicy,
}

impl SessionFactory {
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template: Arc::new(template),
            model: None,
            not_configured: None,
            synthesizer: None,
            language: DEFAULT_LANGUAGE.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_not_configured_reason(mut self, reason: impl Into<String>) -> Self {
        self.not_configured = Some(reason.into());
        self
    }

    pub fn with_synthesizer(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        language: impl Into<String>,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.language = language.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    pub fn build(&self) -> Session {
        let mut session =
            Session::new(self.template.clone()).with_failure_policy(self.failure_policy);

        if let Some(ref model) = self.model {
            session = session.with_model(model.clone());
        } else if let Some(ref reason) = self.not_configured {
            session = session.with_not_configured_reason(reason.clone());
        }

        if let Some(ref synthesizer) = self.synthesizer {
            session = session.with_synthesizer(synthesizer.clone(), self.language.clone());
        }

        session
    }
}

/// Sessions live until a client deletes them; there is no idle eviction, so
/// clients are expected to `DELETE` the sessions they create
pub struct SessionStore {
    factory: SessionFactory,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn factory(&self) -> &SessionFactory {
        &self.factory
    }

    /// Create and register a fresh session
    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let session = self.factory.build();
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));

        let open = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(id, handle.clone());
            sessions.len()
        };
        tracing::info!(session_id = %id, open_sessions = open, "Session created");

        (id, handle)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session, returning whether it existed
    pub async fn remove(&self, id: &Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(id).is_some();
        if removed {
            tracing::info!(session_id = %id, open_sessions = sessions.len(), "Session removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
