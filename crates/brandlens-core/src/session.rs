//! Login/logout orchestration.
//!
//! Binds the credential store, the user scope and the analysis lifecycle
//! store together so the embedding UI deals with one object. Also owns the
//! trigger-failure contract: a failed trigger call reverts the lifecycle
//! store to idle and raises a transient error that clears itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::{AnalysisApi, ApiError};
use crate::constants::ERROR_AUTOCLEAR;
use crate::models::{Application, Product, VisibilityReport};
use crate::storage::{CredentialStore, FileMedium, MemoryMedium, SharedMedium, UserScope};
use crate::store::AnalysisStore;
use crate::CoreConfig;

/// Identity fields returned by a successful login call.
#[derive(Debug, Clone, Default)]
pub struct LoginProfile {
    pub access_token: String,
    pub session_id: String,
    pub user_id: String,
    pub application_id: String,
    pub first_name: String,
    pub applications: Vec<Application>,
    pub products: Vec<Product>,
}

pub struct Session {
    credentials: CredentialStore,
    scope: Arc<UserScope>,
    analysis: Arc<AnalysisStore>,
    api: AnalysisApi,
    error: Arc<watch::Sender<Option<String>>>,
    error_rx: watch::Receiver<Option<String>>,
    error_generation: Arc<AtomicU64>,
}

impl Session {
    pub fn new(config: &CoreConfig) -> Self {
        let persistent: SharedMedium = Arc::new(FileMedium::new(&config.data_dir));
        let session_medium: SharedMedium = Arc::new(MemoryMedium::new());
        let credentials = CredentialStore::new(
            persistent.clone(),
            session_medium,
            &config.storage_secret,
        );
        let scope = Arc::new(UserScope::new(persistent.clone()));
        // An already-migrated identity no longer has a legacy plaintext
        // entry for the scope to fall back on, so prime it here.
        let user_id = credentials.user_id();
        if !user_id.is_empty() {
            scope.set_current(&user_id);
        }
        let analysis = Arc::new(AnalysisStore::new(scope.clone(), persistent));
        let (error, error_rx) = watch::channel(None);
        Self {
            credentials,
            scope,
            analysis,
            api: AnalysisApi::new(config.api_base_url.clone()),
            error: Arc::new(error),
            error_rx,
            error_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn analysis(&self) -> &Arc<AnalysisStore> {
        &self.analysis
    }

    pub fn api(&self) -> &AnalysisApi {
        &self.api
    }

    pub fn is_logged_in(&self) -> bool {
        !self.credentials.access_token().is_empty()
    }

    /// The transient trigger-failure message; `None` whenever there is
    /// nothing to show.
    pub fn error_signal(&self) -> watch::Receiver<Option<String>> {
        self.error_rx.clone()
    }

    /// Populates both credential scopes and re-scopes the lifecycle store to
    /// the new user, resuming any analysis that user left in flight.
    pub fn login(&self, profile: LoginProfile) {
        self.credentials.set_access_token(&profile.access_token);
        self.credentials.set_session_id(&profile.session_id);
        self.credentials.set_user_id(&profile.user_id);
        self.credentials.set_application_id(&profile.application_id);
        self.credentials.set_first_name(&profile.first_name);
        self.credentials.set_applications(&profile.applications);
        self.credentials.set_products(&profile.products);

        self.scope.set_current(&profile.user_id);
        self.analysis.set_user_id(&profile.user_id);
        // A user who already has analyzed products has nothing "first" left
        // to watch.
        self.analysis.set_first_analysis(profile.products.is_empty());
    }

    /// Clears every credential (both scopes and legacy locations) and
    /// detaches the lifecycle store. The persisted analysis record survives
    /// for the next login of the same user.
    pub fn logout(&self) {
        self.credentials.clear_all();
        self.analysis.clear_user_id();
    }

    /// Marks the lifecycle store active and issues the trigger call. On
    /// failure the store reverts to idle and a transient error is raised
    /// that auto-clears after a fixed delay.
    pub async fn run_analysis(&self, resource_id: &str) -> Result<(), ApiError> {
        self.analysis.start_analysis(resource_id);
        match self
            .api
            .trigger_analysis(&self.credentials.access_token(), resource_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::warn!(resource_id, %error, "trigger failed, reverting to idle");
                self.analysis.clear_analysis_state();
                self.raise_error(format!("Analysis could not be started: {error}"));
                Err(error)
            }
        }
    }

    /// Polls the status endpoint until it reports ready, mirroring the
    /// result into a readiness signal the pipeline timer gates on, and
    /// completing the lifecycle store when the data arrives.
    pub fn spawn_status_poller(&self, resource_id: &str, interval: Duration) -> StatusPoller {
        let api = self.api.clone();
        let analysis = self.analysis.clone();
        let access_token = self.credentials.access_token();
        let resource_id = resource_id.to_string();
        let (ready_tx, ready_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                match api.poll_status(&access_token, &resource_id).await {
                    Ok(poll) if poll.ready => {
                        analysis.complete_analysis();
                        let _ = ready_tx.send(true);
                        return poll.report;
                    }
                    Ok(_) => {}
                    Err(error) if error.is_unauthorized() => {
                        tracing::warn!("status poll rejected: credential no longer valid");
                        return None;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "status poll failed, retrying");
                    }
                }
                tokio::time::sleep(interval).await;
            }
        });

        StatusPoller {
            ready: ready_rx,
            task,
        }
    }

    fn raise_error(&self, message: String) {
        let generation = self.error_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.error.send(Some(message));
        let sender = self.error.clone();
        let generations = self.error_generation.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ERROR_AUTOCLEAR).await;
            // A newer error keeps its own clear timer; stand down.
            if generations.load(Ordering::SeqCst) == generation {
                let _ = sender.send(None);
            }
        });
    }
}

/// Handle on the background status poller.
pub struct StatusPoller {
    ready: watch::Receiver<bool>,
    task: JoinHandle<Option<VisibilityReport>>,
}

impl StatusPoller {
    /// The readiness signal to feed [`crate::pipeline::spawn`].
    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }

    /// Waits for the poller to finish and returns the report, if any.
    pub async fn join(self) -> Option<VisibilityReport> {
        self.task.await.unwrap_or(None)
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> CoreConfig {
        CoreConfig {
            data_dir: dir.to_path_buf(),
            // Nothing listens on port 1; trigger calls fail fast.
            api_base_url: "http://127.0.0.1:1".to_string(),
            storage_secret: "test-secret".to_string(),
        }
    }

    fn profile(user_id: &str, products: Vec<Product>) -> LoginProfile {
        LoginProfile {
            access_token: "tok".into(),
            session_id: "sess".into(),
            user_id: user_id.into(),
            application_id: "app".into(),
            first_name: "Ada".into(),
            applications: Vec::new(),
            products,
        }
    }

    #[tokio::test]
    async fn test_login_populates_credentials_and_scopes_analysis() {
        let dir = tempdir().unwrap();
        let session = Session::new(&test_config(dir.path()));
        assert!(!session.is_logged_in());

        session.login(profile("u1", Vec::new()));
        assert!(session.is_logged_in());
        assert_eq!(session.credentials().user_id(), "u1");
        assert_eq!(session.credentials().first_name(), "Ada");
        assert!(session.analysis().first_analysis_pending());
    }

    #[tokio::test]
    async fn test_returning_user_with_products_skips_first_analysis() {
        let dir = tempdir().unwrap();
        let session = Session::new(&test_config(dir.path()));
        session.login(profile(
            "u1",
            vec![Product {
                id: "p1".into(),
                name: "Acme".into(),
                domain: None,
            }],
        ));
        assert!(!session.analysis().first_analysis_pending());
    }

    #[tokio::test]
    async fn test_logout_clears_credentials_but_keeps_analysis_record() {
        let dir = tempdir().unwrap();
        let session = Session::new(&test_config(dir.path()));
        session.login(profile("u1", Vec::new()));
        session.analysis().start_analysis("r1");

        session.logout();
        assert!(!session.is_logged_in());
        assert_eq!(session.credentials().user_id(), "");
        assert!(!session.analysis().snapshot().is_analyzing);

        // Same user logs back in: the in-flight run resumes.
        session.login(profile("u1", Vec::new()));
        let state = session.analysis().snapshot();
        assert!(state.is_analyzing);
        assert_eq!(state.resource_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_session_reopen_primes_scope_from_migrated_identity() {
        let dir = tempdir().unwrap();
        {
            let session = Session::new(&test_config(dir.path()));
            session.login(profile("u1", Vec::new()));
            session.analysis().start_analysis("r1");
        }
        // New process: the user id only exists encrypted, yet the analysis
        // record still resolves to the same scope.
        let session = Session::new(&test_config(dir.path()));
        let state = session.analysis().snapshot();
        assert!(state.is_analyzing);
        assert_eq!(state.resource_id.as_deref(), Some("r1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trigger_reverts_to_idle_and_raises_transient_error() {
        let dir = tempdir().unwrap();
        let session = Session::new(&test_config(dir.path()));
        session.login(profile("u1", Vec::new()));
        let mut errors = session.error_signal();

        let result = session.run_analysis("prod-1").await;
        assert!(result.is_err());
        assert!(!session.analysis().snapshot().is_analyzing);
        assert!(errors.borrow_and_update().is_some());

        // The message clears itself after the fixed delay.
        errors.changed().await.unwrap();
        assert!(errors.borrow().is_none());
    }
}
