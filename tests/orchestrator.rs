//! End-to-end orchestration tests against mock collaborators: a scripted or
//! hanging completion backend, an in-memory screenshot source, and an
//! event-recording UI bridge.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use snapsolver::{
    AppConfig, CompletionBackend, CompletionRequest, OptimizationFocus, Orchestrator,
    ProcessingEvent, ProviderError, ScreenshotSource, UiBridge, View,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ─── Mock collaborators ──────────────────────────────────────────────────

struct MockUi {
    events: Mutex<Vec<ProcessingEvent>>,
    view: Mutex<View>,
    solution: Mutex<Option<serde_json::Value>>,
}

impl MockUi {
    fn new(view: View) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            view: Mutex::new(view),
            solution: Mutex::new(None),
        }
    }

    fn events(&self) -> Vec<ProcessingEvent> {
        self.events.lock().clone()
    }

    fn has_event(&self, wanted: &ProcessingEvent) -> bool {
        self.events.lock().iter().any(|e| e == wanted)
    }
}

impl UiBridge for MockUi {
    fn is_initialized(&self) -> bool {
        true
    }

    fn current_solution(&self) -> anyhow::Result<Option<serde_json::Value>> {
        Ok(self.solution.lock().clone())
    }

    fn view(&self) -> View {
        *self.view.lock()
    }

    fn set_view(&self, view: View) {
        *self.view.lock() = view;
    }

    fn preferred_language(&self) -> Option<String> {
        None
    }

    fn send(&self, event: ProcessingEvent) {
        self.events.lock().push(event);
    }
}

struct MockScreenshots {
    queue: Mutex<Vec<PathBuf>>,
    extra: Mutex<Vec<PathBuf>>,
    extra_cleared: AtomicBool,
}

impl MockScreenshots {
    fn new(queue: Vec<PathBuf>, extra: Vec<PathBuf>) -> Self {
        Self {
            queue: Mutex::new(queue),
            extra: Mutex::new(extra),
            extra_cleared: AtomicBool::new(false),
        }
    }
}

impl ScreenshotSource for MockScreenshots {
    fn queue(&self) -> Vec<PathBuf> {
        self.queue.lock().clone()
    }

    fn extra_queue(&self) -> Vec<PathBuf> {
        self.extra.lock().clone()
    }

    fn preview(&self, path: &Path) -> anyhow::Result<String> {
        Ok(format!("preview:{}", path.display()))
    }

    fn clear_extra_queue(&self) {
        self.extra.lock().clear();
        self.extra_cleared.store(true, Ordering::SeqCst);
    }
}

/// Returns canned responses in order; counts calls.
struct ScriptedBackend {
    responses: Mutex<Vec<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(
        &self,
        request: &CompletionRequest,
        _cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(responses.remove(0))
    }
}

/// Never answers on its own: resolves only when the token fires.
struct HangingBackend {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionBackend for HangingBackend {
    async fn complete(
        &self,
        _request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(ProviderError::Canceled)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────

fn configured() -> Arc<parking_lot::Mutex<AppConfig>> {
    Arc::new(parking_lot::Mutex::new(AppConfig {
        api_key: "test-key".to_string(),
        ..Default::default()
    }))
}

fn write_screenshots(tag: &str, count: usize) -> Vec<PathBuf> {
    let dir = std::env::temp_dir().join(format!("snapsolver-test-{}-{}", std::process::id(), tag));
    std::fs::create_dir_all(&dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(format!("shot-{}.png", i));
            std::fs::write(&path, format!("fake png bytes {}", i)).unwrap();
            path
        })
        .collect()
}

fn orchestrator_with(
    ui: Arc<MockUi>,
    shots: Arc<MockScreenshots>,
    backend: Arc<dyn CompletionBackend>,
) -> Orchestrator {
    Orchestrator::with_factory(
        configured(),
        shots,
        ui,
        Box::new(move |_| Some(backend.clone())),
    )
}

const EXTRACTION_JSON: &str = r#"```json
{"problem_statement": "Find two indices summing to target.", "constraints": "n <= 10^4", "example_input": "[2,7,11,15], 9", "example_output": "[0,1]"}
```"#;

const SOLUTION_TEXT: &str = "Thoughts:\n- store complements in a hashmap\n- one pass over the input\n\n```python\ndef two_sum(nums, target):\n    seen = {}\n    for i, n in enumerate(nums):\n        if target - n in seen:\n            return [seen[target - n], i]\n        seen[n] = i\n```\n\nTime complexity: O(n) because we iterate through the array only once. Hashmap lookups are constant time.\nSpace complexity: O(1) because only a bounded number of variables are kept. The hashmap is cleared eagerly.";

// ─── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_queue_fires_no_screenshots_without_network() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(vec![], vec![]));
    let backend = ScriptedBackend::new(vec![]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend.clone());

    orchestrator.process_screenshots().await;

    assert_eq!(
        ui.events(),
        vec![ProcessingEvent::InitialStart, ProcessingEvent::NoScreenshots]
    );
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn vanished_files_fire_no_screenshots() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(
        vec![PathBuf::from("/nonexistent/screenshot.png")],
        vec![],
    ));
    let backend = ScriptedBackend::new(vec![]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend.clone());

    orchestrator.process_screenshots().await;

    assert!(ui.has_event(&ProcessingEvent::NoScreenshots));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credential_fires_api_key_invalid_without_network() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(
        write_screenshots("no-key", 1),
        vec![],
    ));
    // Real factory, no API key configured anywhere.
    let config = Arc::new(parking_lot::Mutex::new(AppConfig::default()));
    let orchestrator = Orchestrator::new(config, shots, ui.clone());

    orchestrator.process_screenshots().await;

    assert_eq!(ui.events(), vec![ProcessingEvent::ApiKeyInvalid]);
}

#[tokio::test]
async fn end_to_end_solve_reports_solution_success() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(
        write_screenshots("e2e", 3),
        vec![PathBuf::from("/stale/debug-shot.png")],
    ));
    let backend = ScriptedBackend::new(vec![EXTRACTION_JSON, SOLUTION_TEXT]);
    let orchestrator = orchestrator_with(ui.clone(), shots.clone(), backend.clone());

    orchestrator.process_screenshots().await;

    // One extraction call carrying all three screenshots, one solve call.
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    {
        let requests = backend.requests.lock();
        assert_eq!(requests[0].images.len(), 3);
        assert!(requests[1].images.is_empty());
        assert!(requests[1].prompt.contains("Find two indices summing to target."));
    }

    let events = ui.events();
    assert_eq!(events.first(), Some(&ProcessingEvent::InitialStart));
    let extracted = events.iter().find_map(|e| match e {
        ProcessingEvent::ProblemExtracted(p) => Some(p.clone()),
        _ => None,
    });
    assert_eq!(
        extracted.unwrap().problem_statement,
        "Find two indices summing to target."
    );
    let solution = match events.last().unwrap() {
        ProcessingEvent::SolutionSuccess(s) => s.clone(),
        other => panic!("expected SolutionSuccess, got {:?}", other),
    };
    assert!(solution.code.starts_with("def two_sum"));
    assert!(solution.time_complexity.starts_with("O(n)"));
    assert!(solution.space_complexity.starts_with("O(1)"));
    assert_eq!(
        solution.thoughts,
        vec!["store complements in a hashmap", "one pass over the input"]
    );

    // Progress checkpoints at 20/40/60/100
    let checkpoints: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            ProcessingEvent::Progress(p) => Some(p.progress),
            _ => None,
        })
        .collect();
    assert_eq!(checkpoints, vec![20, 40, 60, 100]);

    assert_eq!(ui.view(), View::Solutions);
    assert!(shots.extra_cleared.load(Ordering::SeqCst));
    assert!(orchestrator.problem_info().is_some());
}

#[tokio::test]
async fn extraction_parse_failure_resets_view_with_error() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(write_screenshots("parse", 1), vec![]));
    let backend = ScriptedBackend::new(vec!["Sorry, I cannot read these screenshots."]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend);

    orchestrator.process_screenshots().await;

    let error = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::InitialSolutionError(msg) => Some(msg),
        _ => None,
    });
    assert_eq!(
        error.unwrap(),
        "Failed to parse problem information. Please try again or use clearer screenshots."
    );
    assert_eq!(ui.view(), View::Queue);
}

#[tokio::test]
async fn unauthorized_failure_routes_to_api_key_invalid() {
    init_logs();
    struct UnauthorizedBackend;
    #[async_trait]
    impl CompletionBackend for UnauthorizedBackend {
        async fn complete(
            &self,
            _request: &CompletionRequest,
            _cancel: &CancellationToken,
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Unauthorized)
        }
    }

    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(write_screenshots("auth", 1), vec![]));
    let orchestrator = orchestrator_with(ui.clone(), shots, Arc::new(UnauthorizedBackend));

    orchestrator.process_screenshots().await;

    assert!(ui.has_event(&ProcessingEvent::ApiKeyInvalid));
    assert_eq!(ui.view(), View::Queue);
}

#[tokio::test]
async fn cancellation_reports_canceled_never_generic() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(write_screenshots("cancel", 1), vec![]));
    let backend = Arc::new(HangingBackend {
        calls: AtomicUsize::new(0),
    });
    let orchestrator = Arc::new(orchestrator_with(ui.clone(), shots, backend.clone()));

    let task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.process_screenshots().await })
    };

    // Let the pipeline reach the in-flight network call, then abort it.
    while backend.calls.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    orchestrator.cancel_ongoing();
    task.await.unwrap();

    assert!(ui.has_event(&ProcessingEvent::InitialSolutionError(
        "Processing was canceled by the user.".to_string()
    )));
    // Never the generic server-error message
    assert!(!ui.events().iter().any(|e| matches!(
        e,
        ProcessingEvent::InitialSolutionError(msg) if msg.contains("Server error")
    )));
    // Cancellation clears the stored problem state
    assert!(orchestrator.problem_info().is_none());
    assert_eq!(ui.view(), View::Queue);
}

#[tokio::test]
async fn cancel_with_nothing_in_flight_is_silent() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(vec![], vec![]));
    let backend = ScriptedBackend::new(vec![]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend);

    orchestrator.cancel_ongoing();
    orchestrator.cancel_ongoing();

    assert!(ui.events().is_empty());
}

#[tokio::test]
async fn debug_pass_combines_queues_and_sets_flag() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let main_shots = write_screenshots("debug-main", 1);
    let extra_shots = write_screenshots("debug-extra", 2);
    let shots = Arc::new(MockScreenshots::new(main_shots, extra_shots));
    let backend = ScriptedBackend::new(vec![
        EXTRACTION_JSON,
        SOLUTION_TEXT,
        "Debug Analysis: the loop never advances.\n```python\ndef two_sum_fixed():\n    pass\n```\nTime complexity: O(n) because one pass remains.\nSpace complexity: O(n) because the hashmap returns.",
    ]);
    let orchestrator = orchestrator_with(ui.clone(), shots.clone(), backend.clone());

    // Seed problem state and the UI-held current solution with a full solve.
    orchestrator.process_screenshots().await;
    let current = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::SolutionSuccess(s) => Some(s),
        _ => None,
    });
    *ui.solution.lock() = Some(serde_json::to_value(current.unwrap()).unwrap());

    // Extra queue was cleared by the successful solve; refill it.
    *shots.extra.lock() = write_screenshots("debug-extra2", 2);
    assert_eq!(ui.view(), View::Solutions);
    orchestrator.process_screenshots().await;

    assert!(ui.has_event(&ProcessingEvent::DebugStart));
    let debug = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::DebugSuccess(s) => Some(s),
        _ => None,
    });
    let debug = debug.expect("debug success event");
    assert_eq!(debug.code, "def two_sum_fixed():\n    pass");
    assert!(debug.debug_analysis.as_deref().unwrap().contains("never advances"));
    assert!(orchestrator.has_debugged());

    // Debug request carried the main shot plus both new extra shots.
    let requests = backend.requests.lock();
    assert_eq!(requests.last().unwrap().images.len(), 3);
}

#[tokio::test]
async fn debug_without_current_solution_fails_cleanly() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Solutions));
    let shots = Arc::new(MockScreenshots::new(
        vec![],
        write_screenshots("debug-nosol", 1),
    ));
    let backend = ScriptedBackend::new(vec!["unused"]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend.clone());

    orchestrator.process_screenshots().await;

    let error = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::DebugError(msg) => Some(msg),
        _ => None,
    });
    assert!(error.is_some());
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(!orchestrator.has_debugged());
}

#[tokio::test]
async fn refinement_uses_ui_held_solution() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Queue));
    let shots = Arc::new(MockScreenshots::new(write_screenshots("refine", 1), vec![]));
    let backend = ScriptedBackend::new(vec![
        EXTRACTION_JSON,
        SOLUTION_TEXT,
        "Thoughts:\n- two pointers over sorted input\n```python\ndef two_sum_opt():\n    pass\n```\nTime complexity: O(n log n) because sorting dominates.\nSpace complexity: O(1) because we sort in place.",
    ]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend.clone());

    orchestrator.process_screenshots().await;
    let current = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::SolutionSuccess(s) => Some(s),
        _ => None,
    });
    *ui.solution.lock() = Some(serde_json::to_value(current.unwrap()).unwrap());

    orchestrator
        .refine(OptimizationFocus::Time, Some("Avoid the hashmap.".to_string()))
        .await;

    assert!(ui.has_event(&ProcessingEvent::RefinementStart));
    let refined = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::RefinementSuccess(s) => Some(s),
        _ => None,
    });
    let refined = refined.expect("refinement success event");
    assert_eq!(refined.code, "def two_sum_opt():\n    pass");
    assert!(refined.time_complexity.starts_with("O(n log n)"));
    assert!(backend.requests.lock().last().unwrap().prompt.contains("Avoid the hashmap."));
}

#[tokio::test]
async fn refinement_without_solution_reports_refinement_error() {
    init_logs();
    let ui = Arc::new(MockUi::new(View::Solutions));
    let shots = Arc::new(MockScreenshots::new(vec![], vec![]));
    let backend = ScriptedBackend::new(vec![]);
    let orchestrator = orchestrator_with(ui.clone(), shots, backend.clone());

    orchestrator.refine(OptimizationFocus::Both, None).await;

    let error = ui.events().into_iter().find_map(|e| match e {
        ProcessingEvent::RefinementError(msg) => Some(msg),
        _ => None,
    });
    assert!(error.unwrap().contains("No current solution available"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}
