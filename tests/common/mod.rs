//! Shared test harness: a temp workspace plus stub collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use spark_agent::lesson::publish::{LessonBundle, LessonPublisher};
use spark_agent::models::{GenerationError, GenerationRequest, TextGenerator};
use spark_agent::scheduler::{CallScheduler, SchedulerConfig};
use spark_agent::tools::{build_tools, CodeRunner, ExecOutcome, RunContext, ToolSet};
use spark_agent::workspace::{LocalWorkspace, PendingSync};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Stub generator
// ---------------------------------------------------------------------------

/// Replies from a script, then falls back to a fixed reply.
pub struct StubGenerator {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: String,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl StubGenerator {
    pub fn fixed(reply: &str) -> Self {
        Self::scripted(vec![], reply)
    }

    pub fn scripted(script: Vec<Result<String, GenerationError>>, fallback: &str) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: fallback.to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

// ---------------------------------------------------------------------------
// Stub code runner
// ---------------------------------------------------------------------------

pub struct StubRunner {
    outcome: Result<ExecOutcome, String>,
    pub seen: Mutex<Vec<(PathBuf, Option<String>)>>,
}

impl StubRunner {
    pub fn ok(stdout: &str, stderr: &str) -> Self {
        Self::with(Ok(ExecOutcome {
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code: Some(0),
            timed_out: false,
        }))
    }

    pub fn with(outcome: Result<ExecOutcome, String>) -> Self {
        Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn runs(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl CodeRunner for StubRunner {
    async fn run(&self, script: &Path, stdin: Option<String>) -> anyhow::Result<ExecOutcome> {
        self.seen.lock().unwrap().push((script.to_path_buf(), stdin));
        self.outcome.clone().map_err(|e| anyhow::anyhow!(e))
    }
}

// ---------------------------------------------------------------------------
// Recording publisher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<LessonBundle>>,
    pub fail: bool,
}

#[async_trait]
impl LessonPublisher for RecordingPublisher {
    async fn publish(&self, bundle: &LessonBundle) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("lesson store unavailable");
        }
        self.published.lock().unwrap().push(bundle.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Scheduler settings that keep tests fast: no spacing, 1 ms backoff.
pub fn fast_scheduler() -> CallScheduler {
    CallScheduler::new(SchedulerConfig {
        min_interval_between_start: Duration::ZERO,
        start_jitter: Duration::ZERO,
        base_retry_delay: Duration::from_millis(1),
        max_retry_delay: Duration::from_millis(1),
        retry_jitter: Duration::ZERO,
        ..SchedulerConfig::default()
    })
}

pub struct Harness {
    pub dir: TempDir,
    pub workspace: Arc<LocalWorkspace>,
    pub generator: Arc<StubGenerator>,
    pub runner: Arc<StubRunner>,
    pub publisher: Arc<RecordingPublisher>,
    pub tools: ToolSet,
}

pub struct HarnessBuilder {
    enforce: bool,
    generator: StubGenerator,
    runner: StubRunner,
    publisher: RecordingPublisher,
}

impl HarnessBuilder {
    pub fn generator(mut self, g: StubGenerator) -> Self {
        self.generator = g;
        self
    }

    pub fn runner(mut self, r: StubRunner) -> Self {
        self.runner = r;
        self
    }

    pub fn publisher(mut self, p: RecordingPublisher) -> Self {
        self.publisher = p;
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let workspace = Arc::new(LocalWorkspace::new(dir.path()));
        let generator = Arc::new(self.generator);
        let runner = Arc::new(self.runner);
        let publisher = Arc::new(self.publisher);
        let ctx = RunContext {
            root_dir: dir.path().to_path_buf(),
            user_id: "user-1".into(),
            service_account_json: None,
            enforce_lesson_pipeline: self.enforce,
            default_model: "default-model".into(),
            workspace: workspace.clone(),
            scheduler: fast_scheduler(),
            generator: generator.clone(),
            code_runner: runner.clone(),
            publisher: publisher.clone(),
        };
        Harness {
            dir,
            workspace,
            generator,
            runner,
            publisher,
            tools: build_tools(Arc::new(ctx)),
        }
    }
}

pub fn builder(enforce: bool) -> HarnessBuilder {
    HarnessBuilder {
        enforce,
        generator: StubGenerator::fixed("{}"),
        runner: StubRunner::ok("", ""),
        publisher: RecordingPublisher::default(),
    }
}

pub fn harness(enforce: bool) -> Harness {
    builder(enforce).build()
}

impl Harness {
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) {
        let p = self.path(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    pub fn pending(&self) -> Vec<(String, PendingSync)> {
        self.workspace.pending()
    }

    pub fn is_pending_write(&self, rel: &str) -> bool {
        self.pending()
            .iter()
            .any(|(p, k)| p == rel && *k == PendingSync::Write)
    }
}
