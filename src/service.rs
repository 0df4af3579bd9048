//! Classification orchestration with state machine.
//!
//! IDLE → PENDING → SUCCEEDED | FAILED → IDLE
//!
//! Rate governor → Gemini → classifier → history → voice, strictly in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::{info, warn};

use crate::classifier::{self, BinCategory};
use crate::error::{Rejected, VoiceError};
use crate::gemini::{self, AnswerSource};
use crate::history::HistoryEntry;
use crate::state::AppState;
use crate::voice::VoiceOutput;

pub const NO_ANSWER: &str = "Aucune réponse.";
pub const TRANSPORT_ERROR_MESSAGE: &str = "Erreur lors de la communication avec Gemini.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Pending => write!(f, "PENDING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// What one submission produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// `Succeeded` or `Failed`.
    pub state: ServiceState,
    pub text: String,
    pub bin: Option<BinCategory>,
    /// Set when speech was unlocked but no voice could be used.
    pub voice_error: Option<VoiceError>,
}

/// Clears the busy flag and returns to IDLE however `submit` exits.
struct BusyGuard<'a> {
    busy: &'a AtomicBool,
    state: &'a Mutex<ServiceState>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        if *state != ServiceState::Idle {
            info!("State: {} → IDLE", *state);
            *state = ServiceState::Idle;
        }
        self.busy.store(false, Ordering::Release);
    }
}

pub struct ClassificationService<A> {
    source: A,
    voice: Option<Arc<VoiceOutput>>,
    app: Mutex<AppState>,
    state: Mutex<ServiceState>,
    busy: AtomicBool,
    last_response: Mutex<Option<String>>,
}

impl<A: AnswerSource> ClassificationService<A> {
    pub fn new(source: A, app: AppState, voice: Option<Arc<VoiceOutput>>) -> Self {
        Self {
            source,
            voice,
            app: Mutex::new(app),
            state: Mutex::new(ServiceState::Idle),
            busy: AtomicBool::new(false),
            last_response: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Shared access to counters, history and theme.
    pub fn app(&self) -> MutexGuard<'_, AppState> {
        self.app.lock().unwrap()
    }

    pub fn voice(&self) -> Option<&Arc<VoiceOutput>> {
        self.voice.as_ref()
    }

    pub fn last_response(&self) -> Option<String> {
        self.last_response.lock().unwrap().clone()
    }

    /// Classify one object. Rejections leave every piece of state untouched.
    pub async fn submit(&self, query: &str) -> Result<Outcome, Rejected> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Rejected::EmptyQuery);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Rejected::Busy);
        }
        let _guard = BusyGuard {
            busy: &self.busy,
            state: &self.state,
        };

        if let Err(denied) = self.app().governor_mut().check_and_record(Instant::now()) {
            info!("Request refused: {denied:?}");
            return Err(denied.into());
        }

        self.transition(ServiceState::Pending);
        *self.last_response.lock().unwrap() = None;

        let prompt = gemini::build_prompt(query);
        let (state, text) = match self.source.ask(&prompt).await {
            Ok(answer) => {
                let text = answer.unwrap_or_else(|| NO_ANSWER.to_string());
                self.app()
                    .history_mut()
                    .record(HistoryEntry::new(query, text.clone()));
                (ServiceState::Succeeded, text)
            }
            Err(e) => {
                warn!("Classification of '{query}' failed: {e}");
                (ServiceState::Failed, TRANSPORT_ERROR_MESSAGE.to_string())
            }
        };
        self.transition(state);

        let bin = classifier::classify(&text);
        *self.last_response.lock().unwrap() = Some(text.clone());

        let voice_error = match &self.voice {
            Some(voice) if voice.is_unlocked() => voice.speak(&text).await.err(),
            _ => None,
        };

        Ok(Outcome {
            state,
            text,
            bin,
            voice_error,
        })
    }

    /// Read the last response again. `None` if there is nothing to read or
    /// voice output is disabled.
    pub async fn replay(&self) -> Option<Result<(), VoiceError>> {
        let text = self.last_response()?;
        let voice = self.voice.as_ref()?;
        Some(voice.speak(&text).await)
    }

    fn transition(&self, to: ServiceState) {
        let mut state = self.state.lock().unwrap();
        info!("State: {} → {to}", *state);
        *state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsConfig, VoiceConfig};
    use crate::error::{RateLimited, TransportError};
    use crate::store::{KeyValueStore, MemoryStore, HISTORY_KEY};
    use crate::voice::testing::RecordingBackend;
    use std::time::Duration;
    use tokio::sync::Notify;

    enum Canned {
        Answer(&'static str),
        Missing,
        Broken,
    }

    impl AnswerSource for Canned {
        async fn ask(&self, prompt: &str) -> Result<Option<String>, TransportError> {
            assert!(prompt.contains("Dans quelle poubelle"));
            match self {
                Canned::Answer(a) => Ok(Some(a.to_string())),
                Canned::Missing => Ok(None),
                Canned::Broken => Err(TransportError::Decode("expected value".into())),
            }
        }
    }

    struct Gated(Arc<Notify>);

    impl AnswerSource for Gated {
        async fn ask(&self, _prompt: &str) -> Result<Option<String>, TransportError> {
            self.0.notified().await;
            Ok(Some("poubelle marron".into()))
        }
    }

    fn service<A: AnswerSource>(source: A, store: Arc<MemoryStore>) -> ClassificationService<A> {
        ClassificationService::new(source, AppState::new(&LimitsConfig::default(), store), None)
    }

    #[tokio::test]
    async fn test_success_classifies_and_records() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Canned::Answer("Mettez-la dans la poubelle jaune."), store.clone());

        let outcome = svc.submit("  Canette de soda ").await.unwrap();
        assert_eq!(outcome.state, ServiceState::Succeeded);
        assert_eq!(outcome.text, "Mettez-la dans la poubelle jaune.");
        assert_eq!(outcome.bin, Some(BinCategory::Yellow));
        assert_eq!(outcome.voice_error, None);

        assert_eq!(svc.state(), ServiceState::Idle);
        assert!(!svc.is_busy());
        assert_eq!(svc.app().governor().count(), 1);
        assert_eq!(
            svc.app().history().all(),
            &[HistoryEntry::new("Canette de soda", "Mettez-la dans la poubelle jaune.")]
        );
        assert_eq!(svc.last_response().as_deref(), Some("Mettez-la dans la poubelle jaune."));
        assert!(store.get(HISTORY_KEY).is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_not_recorded() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(Canned::Broken, store.clone());

        let outcome = svc.submit("Sac plastique").await.unwrap();
        assert_eq!(outcome.state, ServiceState::Failed);
        assert_eq!(outcome.text, TRANSPORT_ERROR_MESSAGE);
        assert_eq!(outcome.bin, None);

        assert!(svc.app().history().is_empty());
        assert_eq!(store.get(HISTORY_KEY), None);
        // The attempt still counts against the quota.
        assert_eq!(svc.app().governor().count(), 1);
        assert_eq!(svc.state(), ServiceState::Idle);
        assert!(!svc.is_busy());
        assert_eq!(svc.last_response().as_deref(), Some(TRANSPORT_ERROR_MESSAGE));
    }

    #[tokio::test]
    async fn test_missing_text_uses_placeholder_and_records() {
        let svc = service(Canned::Missing, Arc::new(MemoryStore::new()));

        let outcome = svc.submit("Pot de yaourt").await.unwrap();
        assert_eq!(outcome.state, ServiceState::Succeeded);
        assert_eq!(outcome.text, NO_ANSWER);
        assert_eq!(outcome.bin, None);
        assert_eq!(
            svc.app().history().all(),
            &[HistoryEntry::new("Pot de yaourt", NO_ANSWER)]
        );
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let svc = service(Canned::Answer("poubelle verte"), Arc::new(MemoryStore::new()));
        assert_eq!(svc.submit("   ").await, Err(Rejected::EmptyQuery));
        assert_eq!(svc.app().governor().count(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_rejects_second_submit() {
        let svc = service(Canned::Answer("poubelle verte"), Arc::new(MemoryStore::new()));

        assert!(svc.submit("Bouteille en verre").await.is_ok());
        assert_eq!(
            svc.submit("Bouteille en verre").await,
            Err(Rejected::RateLimited(RateLimited::TooSoon(10)))
        );
        assert_eq!(svc.app().governor().count(), 1);
        assert_eq!(svc.app().history().all().len(), 1);
        assert_eq!(svc.state(), ServiceState::Idle);
        assert!(!svc.is_busy());
    }

    #[tokio::test]
    async fn test_quota_rejects_without_request() {
        let limits = LimitsConfig {
            max_requests: 1,
            cooldown_secs: 0,
            restore_count: false,
        };
        let app = AppState::new(&limits, Arc::new(MemoryStore::new()));
        let svc = ClassificationService::new(Canned::Answer("poubelle grise"), app, None);

        assert!(svc.submit("Sac plastique").await.is_ok());
        assert_eq!(
            svc.submit("Sac plastique").await,
            Err(Rejected::RateLimited(RateLimited::QuotaExceeded(1)))
        );
        assert_eq!(svc.app().history().all().len(), 1);
    }

    #[tokio::test]
    async fn test_busy_rejects_reentrant_submit() {
        let gate = Arc::new(Notify::new());
        let svc = service(Gated(gate.clone()), Arc::new(MemoryStore::new()));

        let (first, second) = tokio::join!(svc.submit("Carton de pizza"), async {
            assert_eq!(svc.state(), ServiceState::Pending);
            let second = svc.submit("Carton de pizza").await;
            gate.notify_one();
            second
        });

        assert_eq!(second, Err(Rejected::Busy));
        assert_eq!(first.unwrap().bin, Some(BinCategory::Brown));
        assert_eq!(svc.app().governor().count(), 1);
        assert!(!svc.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaks_only_when_unlocked() {
        let backend = Arc::new(RecordingBackend::french());
        let voice = Arc::new(VoiceOutput::new(backend.clone(), &VoiceConfig::default()));
        let limits = LimitsConfig {
            cooldown_secs: 0,
            ..LimitsConfig::default()
        };
        let app = AppState::new(&limits, Arc::new(MemoryStore::new()));
        let svc = ClassificationService::new(Canned::Broken, app, Some(voice.clone()));

        svc.submit("Sac plastique").await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(backend.spoken().is_empty());

        voice.unlock().await.unwrap();
        svc.submit("Sac plastique").await.unwrap();
        voice.flush().await;
        // The welcome line is cancelled by the answer; errors are read aloud too.
        assert_eq!(backend.spoken(), vec![TRANSPORT_ERROR_MESSAGE.to_string()]);

        assert_eq!(svc.replay().await, Some(Ok(())));
        voice.flush().await;
        assert_eq!(backend.spoken().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_without_response() {
        let svc = service(Canned::Answer("poubelle verte"), Arc::new(MemoryStore::new()));
        assert_eq!(svc.replay().await, None);
    }
}
