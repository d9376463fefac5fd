//! Sequences the pipeline stages, owns the per-kind cancellation tokens and
//! the session state, and translates stage outcomes into UI events.

use base64::{engine::general_purpose::STANDARD, Engine};
use futures::future::join_all;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::boundary::{ScreenshotSource, UiBridge};
use crate::config::{AppConfig, ConfigSource};
use crate::error::ProcessingError;
use crate::events::{ProcessingEvent, View};
use crate::pipeline::{self, OptimizationFocus, ProblemInfo, ScreenshotInput, SolutionResult};
use crate::provider::{CompletionBackend, ProviderClient};

const INIT_POLL_ATTEMPTS: u32 = 50;
const INIT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FALLBACK_LANGUAGE: &str = "python";

/// Builds a completion backend from the current configuration. `None` means
/// the active provider has no usable credential.
pub type BackendFactory =
    Box<dyn Fn(&AppConfig) -> Option<Arc<dyn CompletionBackend>> + Send + Sync>;

#[derive(Default)]
struct Session {
    problem: Option<ProblemInfo>,
    has_debugged: bool,
}

pub struct Orchestrator {
    config: Arc<dyn ConfigSource>,
    screenshots: Arc<dyn ScreenshotSource>,
    ui: Arc<dyn UiBridge>,
    factory: BackendFactory,
    backend: Mutex<Option<Arc<dyn CompletionBackend>>>,
    session: Mutex<Session>,
    // One live token per kind: main-queue processing and extra/debug processing.
    main_cancel: Mutex<Option<CancellationToken>>,
    extra_cancel: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        screenshots: Arc<dyn ScreenshotSource>,
        ui: Arc<dyn UiBridge>,
    ) -> Self {
        Self::with_factory(
            config,
            screenshots,
            ui,
            Box::new(|cfg| {
                ProviderClient::from_config(cfg).map(|c| Arc::new(c) as Arc<dyn CompletionBackend>)
            }),
        )
    }

    /// Inject a custom backend factory (used by hosts with their own client
    /// pooling and by tests).
    pub fn with_factory(
        config: Arc<dyn ConfigSource>,
        screenshots: Arc<dyn ScreenshotSource>,
        ui: Arc<dyn UiBridge>,
        factory: BackendFactory,
    ) -> Self {
        let orchestrator = Self {
            config,
            screenshots,
            ui,
            factory,
            backend: Mutex::new(None),
            session: Mutex::new(Session::default()),
            main_cancel: Mutex::new(None),
            extra_cancel: Mutex::new(None),
        };
        orchestrator.refresh_client();
        orchestrator
    }

    /// Rebuild the provider client from the current configuration. The host
    /// calls this on every config-change notification.
    pub fn refresh_client(&self) {
        let cfg = self.config.load();
        *self.backend.lock() = (self.factory)(&cfg);
    }

    pub fn has_debugged(&self) -> bool {
        self.session.lock().has_debugged
    }

    pub fn problem_info(&self) -> Option<ProblemInfo> {
        self.session.lock().problem.clone()
    }

    fn ensure_backend(&self) -> Option<Arc<dyn CompletionBackend>> {
        if let Some(backend) = self.backend.lock().clone() {
            return Some(backend);
        }
        // One re-initialization attempt before giving up.
        self.refresh_client();
        self.backend.lock().clone()
    }

    /// Process whichever screenshot queue the active view selects: the primary
    /// queue for a fresh extract+solve run, the extra queue for a debug pass.
    pub async fn process_screenshots(&self) {
        let cfg = self.config.load();
        if self.ensure_backend().is_none() {
            log::error!("{} client not initialized", cfg.provider.label());
            self.ui.send(ProcessingEvent::ApiKeyInvalid);
            return;
        }

        let view = self.ui.view();
        log::info!("Processing screenshots in view: {:?}", view);
        match view {
            View::Queue => self.process_main_queue().await,
            View::Solutions => self.process_extra_queue().await,
        }
    }

    async fn process_main_queue(&self) {
        self.ui.send(ProcessingEvent::InitialStart);

        let queue = self.screenshots.queue();
        if queue.is_empty() {
            log::info!("No screenshots found in queue");
            self.ui.send(ProcessingEvent::NoScreenshots);
            return;
        }

        let existing: Vec<PathBuf> = queue.into_iter().filter(|p| p.exists()).collect();
        if existing.is_empty() {
            log::warn!("Screenshot files don't exist on disk");
            self.ui.send(ProcessingEvent::NoScreenshots);
            return;
        }

        let token = {
            let mut guard = self.main_cancel.lock();
            if guard.is_some() {
                log::warn!("Main processing already in flight, ignoring request");
                return;
            }
            let token = CancellationToken::new();
            *guard = Some(token.clone());
            token
        };

        let result = self.run_initial(&existing, &token).await;
        *self.main_cancel.lock() = None;

        match result {
            Ok(solution) => {
                self.ui.send(ProcessingEvent::SolutionSuccess(solution));
                self.ui.set_view(View::Solutions);
            }
            Err(e) if e.is_canceled() => {
                self.ui.send(ProcessingEvent::InitialSolutionError(
                    "Processing was canceled by the user.".to_string(),
                ));
                self.ui.set_view(View::Queue);
            }
            Err(e) if e.is_credential_error() => {
                log::error!("Processing failed: {}", e);
                self.ui.send(ProcessingEvent::ApiKeyInvalid);
                self.ui.set_view(View::Queue);
            }
            Err(e) => {
                log::error!("Processing failed: {}", e);
                self.ui
                    .send(ProcessingEvent::InitialSolutionError(e.user_message()));
                self.ui.set_view(View::Queue);
            }
        }
    }

    async fn run_initial(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<SolutionResult, ProcessingError> {
        let shots = self.load_screenshots(paths).await?;
        let cfg = self.config.load();
        let backend = self
            .ensure_backend()
            .ok_or_else(|| ProcessingError::ProviderNotConfigured {
                provider: cfg.provider.label().to_string(),
            })?;
        let language = self.get_language().await;

        self.ui.send(ProcessingEvent::progress(
            "Analyzing problem from screenshots...",
            20,
        ));

        let problem =
            pipeline::extract_problem(backend.as_ref(), &cfg, &shots, &language, cancel).await?;

        self.ui.send(ProcessingEvent::progress(
            "Problem analyzed successfully. Preparing to generate solution...",
            40,
        ));

        self.session.lock().problem = Some(problem.clone());
        // Extraction alone is an intermediate event; the terminal success
        // event fires only once generation also succeeds.
        self.ui.send(ProcessingEvent::ProblemExtracted(problem.clone()));

        self.ui.send(ProcessingEvent::progress(
            "Creating optimal solution with detailed explanations...",
            60,
        ));

        let solution =
            pipeline::generate_solution(backend.as_ref(), &cfg, &problem, &language, cancel)
                .await?;

        // Stale debug shots must not leak into the new solution session.
        self.screenshots.clear_extra_queue();

        self.ui.send(ProcessingEvent::progress(
            "Solution generated successfully",
            100,
        ));

        Ok(solution)
    }

    async fn process_extra_queue(&self) {
        let extra_queue = self.screenshots.extra_queue();
        if extra_queue.is_empty() {
            log::info!("No extra screenshots found in queue");
            self.ui.send(ProcessingEvent::NoScreenshots);
            return;
        }

        let existing_extra: Vec<PathBuf> =
            extra_queue.into_iter().filter(|p| p.exists()).collect();
        if existing_extra.is_empty() {
            log::warn!("Extra screenshot files don't exist on disk");
            self.ui.send(ProcessingEvent::NoScreenshots);
            return;
        }

        self.ui.send(ProcessingEvent::DebugStart);

        let token = {
            let mut guard = self.extra_cancel.lock();
            if guard.is_some() {
                log::warn!("Extra processing already in flight, ignoring request");
                return;
            }
            let token = CancellationToken::new();
            *guard = Some(token.clone());
            token
        };

        // The debug pass sees the full picture: original problem shots plus
        // the new error/test-case shots.
        let mut all_paths: Vec<PathBuf> = self
            .screenshots
            .queue()
            .into_iter()
            .filter(|p| p.exists())
            .collect();
        all_paths.extend(existing_extra);

        let result = self.run_debug(&all_paths, &token).await;
        *self.extra_cancel.lock() = None;

        match result {
            Ok(solution) => {
                self.session.lock().has_debugged = true;
                self.ui.send(ProcessingEvent::DebugSuccess(solution));
            }
            Err(e) if e.is_canceled() => {
                self.ui.send(ProcessingEvent::DebugError(
                    "Extra processing was canceled by the user.".to_string(),
                ));
            }
            Err(e) => {
                log::error!("Debug processing failed: {}", e);
                self.ui.send(ProcessingEvent::DebugError(e.user_message()));
            }
        }
    }

    async fn run_debug(
        &self,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<SolutionResult, ProcessingError> {
        let problem = self.session.lock().problem.clone().ok_or_else(|| {
            ProcessingError::Unknown(
                "No problem info available. Process screenshots first.".to_string(),
            )
        })?;
        let current = self.current_solution_from_ui()?;

        self.ui.send(ProcessingEvent::progress(
            "Analyzing screenshots and debugging solution...",
            40,
        ));

        let shots = self.load_screenshots(paths).await?;
        let cfg = self.config.load();
        let backend = self
            .ensure_backend()
            .ok_or_else(|| ProcessingError::ProviderNotConfigured {
                provider: cfg.provider.label().to_string(),
            })?;
        let language = self.get_language().await;

        self.ui.send(ProcessingEvent::progress(
            "Analyzing code and generating debug feedback...",
            60,
        ));

        let solution = pipeline::debug_solution(
            backend.as_ref(),
            &cfg,
            &problem,
            &current,
            &shots,
            &language,
            cancel,
        )
        .await?;

        self.ui
            .send(ProcessingEvent::progress("Debug analysis complete", 100));

        Ok(solution)
    }

    /// Refine the UI-held current solution toward a complexity goal.
    pub async fn refine(&self, focus: OptimizationFocus, instruction: Option<String>) {
        let cfg = self.config.load();
        if self.ensure_backend().is_none() {
            log::error!("{} client not initialized", cfg.provider.label());
            self.ui.send(ProcessingEvent::ApiKeyInvalid);
            return;
        }

        let current = match self.current_solution_from_ui() {
            Ok(current) => current,
            Err(e) => {
                self.ui
                    .send(ProcessingEvent::RefinementError(e.user_message()));
                return;
            }
        };

        self.ui.send(ProcessingEvent::RefinementStart);

        // Refinement shares the main-kind token: it supersedes a fresh solve.
        let token = {
            let mut guard = self.main_cancel.lock();
            if guard.is_some() {
                log::warn!("Main processing already in flight, ignoring refinement request");
                return;
            }
            let token = CancellationToken::new();
            *guard = Some(token.clone());
            token
        };

        let result = self.run_refine(&current, focus, instruction, &token).await;
        *self.main_cancel.lock() = None;

        match result {
            Ok(solution) => {
                self.ui.send(ProcessingEvent::RefinementSuccess(solution));
            }
            Err(e) if e.is_canceled() => {
                self.ui.send(ProcessingEvent::RefinementError(
                    "Refinement was canceled by the user.".to_string(),
                ));
            }
            Err(e) => {
                log::error!("Refinement failed: {}", e);
                self.ui
                    .send(ProcessingEvent::RefinementError(e.user_message()));
            }
        }
    }

    async fn run_refine(
        &self,
        current: &SolutionResult,
        focus: OptimizationFocus,
        instruction: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<SolutionResult, ProcessingError> {
        let problem = self.session.lock().problem.clone().ok_or_else(|| {
            ProcessingError::Unknown(
                "No problem info available. Process screenshots first.".to_string(),
            )
        })?;
        let cfg = self.config.load();
        let backend = self
            .ensure_backend()
            .ok_or_else(|| ProcessingError::ProviderNotConfigured {
                provider: cfg.provider.label().to_string(),
            })?;
        let language = self.get_language().await;

        pipeline::refine_solution(
            backend.as_ref(),
            &cfg,
            &problem,
            current,
            focus,
            instruction.as_deref(),
            &language,
            cancel,
        )
        .await
    }

    /// Abort anything in flight and reset the processing state. Idempotent:
    /// the reset notification fires only if an operation was actually live.
    pub fn cancel_ongoing(&self) {
        let mut was_canceled = false;

        if let Some(token) = self.main_cancel.lock().take() {
            token.cancel();
            was_canceled = true;
        }
        if let Some(token) = self.extra_cancel.lock().take() {
            token.cancel();
            was_canceled = true;
        }

        {
            let mut session = self.session.lock();
            session.has_debugged = false;
            session.problem = None;
        }

        if was_canceled {
            log::info!("Canceled ongoing requests");
            self.ui.send(ProcessingEvent::NoScreenshots);
        }
    }

    /// Read screenshots concurrently, skipping (with a log line) any file
    /// that fails; the batch only fails when nothing survives.
    async fn load_screenshots(
        &self,
        paths: &[PathBuf],
    ) -> Result<Vec<ScreenshotInput>, ProcessingError> {
        let reads = paths.iter().map(|path| async move {
            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::error!("Error reading screenshot {}: {}", path.display(), e);
                    return None;
                }
            };
            let preview = match self.screenshots.preview(path) {
                Ok(preview) => preview,
                Err(e) => {
                    log::error!("Error generating preview for {}: {}", path.display(), e);
                    return None;
                }
            };
            Some(ScreenshotInput {
                path: path.clone(),
                preview,
                data: STANDARD.encode(&bytes),
            })
        });

        let shots: Vec<ScreenshotInput> =
            join_all(reads).await.into_iter().flatten().collect();
        if shots.is_empty() {
            return Err(ProcessingError::ScreenshotReadFailure);
        }
        Ok(shots)
    }

    fn current_solution_from_ui(&self) -> Result<SolutionResult, ProcessingError> {
        let value = self
            .ui
            .current_solution()?
            .ok_or(ProcessingError::MissingPriorSolution)?;
        let solution: SolutionResult =
            serde_json::from_value(value).map_err(|_| ProcessingError::MissingPriorSolution)?;
        if solution.code.trim().is_empty() {
            return Err(ProcessingError::MissingPriorSolution);
        }
        Ok(solution)
    }

    /// Language preference: config first, then the UI-held value after a
    /// bounded readiness wait, finally a fixed default. The UI fallback is
    /// likely dead in practice since config always carries a language.
    async fn get_language(&self) -> String {
        let cfg = self.config.load();
        if !cfg.language.is_empty() {
            return cfg.language;
        }

        match wait_for_initialization(self.ui.as_ref()).await {
            Ok(()) => {
                if let Some(language) = self.ui.preferred_language() {
                    return language;
                }
            }
            Err(e) => log::warn!("Could not get language from UI: {}", e),
        }

        FALLBACK_LANGUAGE.to_string()
    }
}

/// Poll UI readiness in 100ms increments, bounded at 5 seconds.
pub(crate) async fn wait_for_initialization(
    ui: &dyn UiBridge,
) -> Result<(), ProcessingError> {
    for _ in 0..INIT_POLL_ATTEMPTS {
        if ui.is_initialized() {
            return Ok(());
        }
        tokio::time::sleep(INIT_POLL_INTERVAL).await;
    }
    Err(ProcessingError::Unknown(
        "App failed to initialize after 5 seconds".to_string(),
    ))
}
