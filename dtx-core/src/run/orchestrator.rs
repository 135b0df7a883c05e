//! Run orchestrator
//!
//! One task owns every piece of mutable state: the tracked directories, the
//! open [`RunBatch`], the result session and the watch runner. Requests from
//! the front end and completions from toolchain processes, the result-file
//! watch and watch processes all arrive as [`Message`]s on a single channel
//! and are handled one at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::ExplorerConfig;
use crate::directories::TestDirectories;
use crate::discovery::{self, DiscoveredTests};
use crate::events::{ExplorerEvent, RejectReason};
use crate::filter::TestFilter;
use crate::results::{parse_trx_file, TestResult};
use crate::toolchain::{CancelSource, CancelToken, RunRequest, Toolchain};
use crate::tree::split_name;
use crate::watch::{WatchRequest, WatchRunner};
use crate::{Error, Result};

use super::batch::RunBatch;
use super::session::ResultSession;

/// Capacity of the event channel per subscriber
const EVENT_CAPACITY: usize = 256;

/// Input to the orchestrator
#[derive(Debug)]
pub enum Message {
    /// Resolve directories again, then discover
    Refresh,
    /// Discover tests in the tracked directories
    Discover,
    Run(TestFilter),
    RerunLast,
    Cancel,
    Shutdown,

    /// Discovery of every directory has finished
    DiscoveryFinished(Vec<DiscoveredTests>),
    /// A result file has settled in the session directory
    ResultFile(PathBuf),
    /// A run chain ended; carries the result files it should have produced
    RunFinished(Result<Vec<PathBuf>>),
    /// A watch process started re-running tests of a namespace
    WatchTriggered(String),
    /// A watch process closed its output
    WatchClosed { directory: PathBuf, generation: u64 },
}

/// Cloneable handle for sending requests and subscribing to events
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Message>,
    events: broadcast::Sender<ExplorerEvent>,
}

impl OrchestratorHandle {
    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ExplorerEvent> {
        self.events.subscribe()
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Other("Orchestrator has stopped".to_string()))
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(Message::Refresh)
    }

    pub fn discover(&self) -> Result<()> {
        self.send(Message::Discover)
    }

    pub fn run(&self, filter: TestFilter) -> Result<()> {
        self.send(Message::Run(filter))
    }

    pub fn run_all(&self) -> Result<()> {
        self.run(TestFilter::all())
    }

    pub fn rerun_last(&self) -> Result<()> {
        self.send(Message::RerunLast)
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(Message::Cancel)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Message::Shutdown)
    }
}

/// One directory of a run
#[derive(Debug, Clone)]
struct RunJob {
    directory: PathBuf,
    result_file: PathBuf,
}

/// Settings shared by every directory of a run
#[derive(Debug, Clone)]
struct RunSettings {
    filter: Option<String>,
    extra_args: Vec<String>,
    skip_build: bool,
    parallel: bool,
}

/// Coordinates discovery, runs and watches
pub struct Orchestrator {
    config: ExplorerConfig,
    workspace_roots: Vec<PathBuf>,
    toolchain: Arc<dyn Toolchain>,
    directories: TestDirectories,
    batch: RunBatch,
    discovering: bool,
    session: Option<ResultSession>,
    last_run: Option<TestFilter>,
    watch: WatchRunner,
    cancel: CancelSource,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    events: broadcast::Sender<ExplorerEvent>,
}

impl Orchestrator {
    /// Create an orchestrator for the given workspace roots
    ///
    /// Nothing is resolved until the first [`Message::Refresh`].
    pub fn new(
        config: ExplorerConfig,
        workspace_roots: Vec<PathBuf>,
        toolchain: Arc<dyn Toolchain>,
    ) -> (Self, OrchestratorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = OrchestratorHandle {
            tx: tx.clone(),
            events: events.clone(),
        };
        let orchestrator = Self {
            config,
            workspace_roots,
            toolchain,
            directories: TestDirectories::default(),
            batch: RunBatch::new(),
            discovering: false,
            session: None,
            last_run: None,
            watch: WatchRunner::new(),
            cancel: CancelSource::new(),
            tx,
            rx,
            events,
        };
        (orchestrator, handle)
    }

    /// Use an already resolved directory set
    pub fn with_directories(mut self, directories: TestDirectories) -> Self {
        self.batch.set_directory_count(directories.len());
        self.directories = directories;
        self
    }

    pub fn directories(&self) -> &TestDirectories {
        &self.directories
    }

    pub fn batch(&self) -> &RunBatch {
        &self.batch
    }

    pub fn is_discovering(&self) -> bool {
        self.discovering
    }

    pub fn last_run(&self) -> Option<&TestFilter> {
        self.last_run.as_ref()
    }

    pub fn watch_runner(&self) -> &WatchRunner {
        &self.watch
    }

    /// Directory holding this session's result files, once created
    pub fn result_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(ResultSession::path)
    }

    /// Handle messages until shutdown
    pub async fn run(mut self) {
        while self.step().await {}
        self.watch.stop_all();
        tracing::debug!("Orchestrator stopped");
    }

    /// Wait for and handle one message
    ///
    /// Returns `false` once the orchestrator should stop.
    pub async fn step(&mut self) -> bool {
        match self.rx.recv().await {
            Some(message) => self.handle(message),
            None => false,
        }
    }

    /// Handle one message
    pub fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::Refresh => self.refresh(),
            Message::Discover => self.start_discovery(),
            Message::Run(filter) => self.start_run(filter),
            Message::RerunLast => match self.last_run.clone() {
                Some(filter) => self.start_run(filter),
                None => {
                    tracing::debug!("Nothing to rerun");
                }
            },
            Message::Cancel => self.cancel_run(),
            Message::Shutdown => {
                self.cancel.cancel();
                self.watch.stop_all();
                return false;
            }
            Message::DiscoveryFinished(found) => self.finish_discovery(found),
            Message::ResultFile(path) => self.result_file(path),
            Message::RunFinished(result) => self.finish_run(result),
            Message::WatchTriggered(namespace) => {
                self.emit(ExplorerEvent::RunStarted(TestFilter::prefix(namespace)));
            }
            Message::WatchClosed {
                directory,
                generation,
            } => self.watch.closed(&directory, generation),
        }
        true
    }

    fn emit(&self, event: ExplorerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn ensure_session(&mut self) -> Result<&ResultSession> {
        if self.session.is_none() {
            let tx = self.tx.clone();
            let session = ResultSession::create(&self.config.staging_dir(), move |path| {
                tracing::info!(path = %path.display(), "New test results file");
                let _ = tx.send(Message::ResultFile(path));
            })?;
            self.session = Some(session);
        }
        self.session
            .as_ref()
            .ok_or_else(|| Error::Other("Result session missing".to_string()))
    }

    fn refresh(&mut self) {
        if self.discovering {
            tracing::debug!("Discovery already in progress, ignoring refresh");
            return;
        }
        self.directories =
            match TestDirectories::resolve(&self.workspace_roots, &self.config.test_project_path) {
                Ok(directories) => directories,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to resolve test directories");
                    TestDirectories::default()
                }
            };
        self.start_discovery();
    }

    fn start_discovery(&mut self) {
        if self.discovering {
            tracing::debug!("Discovery already in progress");
            return;
        }

        self.emit(ExplorerEvent::DiscoveryStarted);

        if let Err(e) = self.ensure_session().map(|_| ()) {
            tracing::error!(error = %e, "Failed to set up test result directory");
            self.emit(ExplorerEvent::DiscoveryFinished(Vec::new()));
            return;
        }

        self.directories.clear_tests();
        let directories = self.directories.test_directories(None);
        self.batch = RunBatch::new();
        self.batch.set_directory_count(directories.len());
        self.discovering = true;

        let toolchain = Arc::clone(&self.toolchain);
        let extra_args = self.config.extra_args();
        let timeout = self.config.discovery_timeout;
        let parallel = self.config.run_in_parallel;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let found = if parallel {
                let handles: Vec<_> = directories
                    .into_iter()
                    .map(|directory| {
                        let toolchain = Arc::clone(&toolchain);
                        let extra_args = extra_args.clone();
                        tokio::spawn(async move {
                            discovery::discover(toolchain.as_ref(), &directory, &extra_args, timeout)
                                .await
                        })
                    })
                    .collect();

                let mut found = Vec::with_capacity(handles.len());
                for handle in handles {
                    match handle.await {
                        Ok(tests) => found.push(tests),
                        Err(e) => tracing::error!(error = %e, "Discovery task panicked"),
                    }
                }
                found
            } else {
                let mut found = Vec::with_capacity(directories.len());
                for directory in &directories {
                    found.push(
                        discovery::discover(toolchain.as_ref(), directory, &extra_args, timeout)
                            .await,
                    );
                }
                found
            };
            let _ = tx.send(Message::DiscoveryFinished(found));
        });
    }

    fn finish_discovery(&mut self, found: Vec<DiscoveredTests>) {
        self.discovering = false;

        let mut discovered = Vec::with_capacity(found.len());
        for tests in found {
            if tests.is_empty() {
                self.directories.remove_directory(&tests.directory);
            } else {
                self.directories
                    .add_tests_for_directory(&tests.directory, &tests.test_names);
                discovered.push(tests);
            }
        }

        // pruning may have shrunk the directory set
        self.batch.set_directory_count(self.directories.len());
        tracing::info!(
            directories = self.directories.len(),
            tests = discovered.iter().map(|d| d.test_names.len()).sum::<usize>(),
            "Discovery finished"
        );
        self.emit(ExplorerEvent::DiscoveryFinished(discovered));

        if self.config.auto_watch {
            self.watch_all();
        }
    }

    fn reject(&self, filter: TestFilter, reason: RejectReason) {
        tracing::warn!(filter = %filter, reason = %reason, "Ignoring request to run tests");
        self.emit(ExplorerEvent::RunRejected { filter, reason });
    }

    fn start_run(&mut self, filter: TestFilter) {
        if self.discovering {
            return self.reject(filter, RejectReason::Discovering);
        }
        if self.batch.is_open() {
            return self.reject(filter, RejectReason::AlreadyRunning);
        }

        let prefix = (!filter.is_all()).then_some(filter.name.as_str());
        let targets = self.directories.test_directories(prefix);
        if targets.is_empty() {
            tracing::warn!(filter = %filter, "Could not find a matching test directory");
            return self.reject(filter, RejectReason::NoMatchingDirectory);
        }

        let result_files: Result<Vec<PathBuf>> = self
            .ensure_session()
            .map(|session| (0..targets.len()).map(|i| session.result_path(i)).collect());
        let jobs: Vec<RunJob> = match result_files {
            Ok(result_files) => targets
                .into_iter()
                .zip(result_files)
                .map(|(directory, result_file)| RunJob {
                    directory,
                    result_file,
                })
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to set up test result directory");
                self.emit(ExplorerEvent::RunFailed {
                    aborted: false,
                    message: e.to_string(),
                });
                return;
            }
        };

        // result names repeat across runs of a session
        for job in &jobs {
            remove_stale_result(&job.result_file);
        }

        self.batch.set_directory_count(self.directories.len());
        self.batch.open(filter.is_all());
        tracing::info!(
            filter = %filter,
            expected = self.batch.expected_files(),
            "Test run started, expecting {} test results file(s) in total",
            self.batch.expected_files()
        );

        self.last_run = Some(filter.clone());
        self.emit(ExplorerEvent::RunStarted(filter.clone()));

        self.cancel.reset();
        let settings = RunSettings {
            filter: filter.expression(),
            extra_args: self.config.extra_args(),
            skip_build: self.config.skips_build(),
            parallel: self.config.run_in_parallel,
        };
        let toolchain = Arc::clone(&self.toolchain);
        let cancel = self.cancel.token();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = run_jobs(toolchain, jobs, settings, cancel).await;
            let _ = tx.send(Message::RunFinished(result));
        });
    }

    fn cancel_run(&mut self) {
        if !self.batch.is_open() {
            tracing::debug!("No test run to cancel");
            return;
        }
        tracing::info!("Cancelling test run");
        self.cancel.cancel();
    }

    fn result_file(&mut self, path: PathBuf) {
        let results = match parse_trx_file(&path) {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to parse test results");
                return;
            }
        };
        self.record_results(results);
    }

    fn record_results(&mut self, results: Vec<TestResult>) {
        if self.batch.is_open() {
            tracing::info!(
                "Parsed {}/{} file(s)",
                self.batch.current_files() + 1,
                self.batch.expected_files()
            );
        }
        if let Some(batch) = self.batch.record_file(results) {
            tracing::info!(
                results = batch.results.len(),
                clear = batch.clear_previous,
                "Parsed all expected test results, updating tree"
            );
            self.emit(ExplorerEvent::NewResults(batch));
        }
    }

    fn finish_run(&mut self, result: Result<Vec<PathBuf>>) {
        match result {
            Ok(result_files) => {
                // a run that wrote nothing would otherwise hold the batch open
                for file in result_files.iter().filter(|f| !f.exists()) {
                    if !self.batch.is_open() {
                        break;
                    }
                    tracing::warn!(path = %file.display(), "Test run produced no result file");
                    self.record_results(Vec::new());
                }
            }
            Err(e) if e.is_aborted() => {
                tracing::info!("Test run was aborted, not retrying");
                self.batch.reset();
                self.emit(ExplorerEvent::RunFailed {
                    aborted: true,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "Error while executing test command");
                self.batch.reset();
                self.emit(ExplorerEvent::RunFailed {
                    aborted: false,
                    message: e.to_string(),
                });
                self.start_discovery();
            }
        }
    }

    /// Start a watch for every tracked directory
    fn watch_all(&mut self) {
        let count = self.directories.len();
        let watch_files: Result<Vec<PathBuf>> = self
            .ensure_session()
            .map(|session| (0..count).map(|i| session.watch_result_path(i)).collect());
        let watch_files = match watch_files {
            Ok(watch_files) => watch_files,
            Err(e) => {
                tracing::error!(error = %e, "Failed to set up test result directory");
                return;
            }
        };

        let directories = self.directories.test_directories(None);
        for (directory, result_file) in directories.into_iter().zip(watch_files) {
            let namespace = self
                .directories
                .first_test_for_directory(&directory)
                .and_then(|name| split_name(name).first().map(|s| s.to_string()))
                .unwrap_or_default();
            let request = WatchRequest {
                directory,
                namespace,
                result_file,
                extra_args: self.config.extra_args(),
            };
            self.watch
                .start(Arc::clone(&self.toolchain), request, self.tx.clone());
        }
    }
}

/// Delete a result file left behind by an earlier run
fn remove_stale_result(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed previous test results file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove previous test results file"
            );
        }
    }
}

/// Run every job, in parallel or one after the other
///
/// In parallel mode every directory runs to completion and the first error
/// is reported. In sequential mode the first error stops the chain.
async fn run_jobs(
    toolchain: Arc<dyn Toolchain>,
    jobs: Vec<RunJob>,
    settings: RunSettings,
    cancel: CancelToken,
) -> Result<Vec<PathBuf>> {
    let result_files = jobs.iter().map(|j| j.result_file.clone()).collect();

    if settings.parallel {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let toolchain = Arc::clone(&toolchain);
                let settings = settings.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    run_directory(toolchain.as_ref(), &job, &settings, cancel).await
                })
            })
            .collect();

        let mut first_error = None;
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(Error::Other(format!("Test task panicked: {}", e))),
            };
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    tracing::error!(error = %e, "Test run failed");
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
    } else {
        for job in &jobs {
            run_directory(toolchain.as_ref(), job, &settings, cancel.clone()).await?;
        }
    }

    Ok(result_files)
}

/// Build, then run the tests of one directory
async fn run_directory(
    toolchain: &dyn Toolchain,
    job: &RunJob,
    settings: &RunSettings,
    cancel: CancelToken,
) -> Result<()> {
    if settings.skip_build {
        tracing::info!(dir = %job.directory.display(), "Skipping build");
    } else {
        let output = toolchain.build(&job.directory).await?;
        if !output.success() {
            tracing::error!(
                target: "dtx::runner_output",
                dir = %job.directory.display(),
                "{}",
                output.stdout
            );
            return Err(Error::BuildFailed {
                directory: job.directory.clone(),
            });
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Aborted);
    }

    let request = RunRequest {
        directory: &job.directory,
        filter: settings.filter.as_deref(),
        result_file: &job.result_file,
        extra_args: &settings.extra_args,
    };
    let output = toolchain.run_tests(request, cancel).await?;
    if output.was_killed() {
        tracing::info!(dir = %job.directory.display(), "User has probably cancelled test run");
        return Err(Error::Aborted);
    }

    tracing::info!(target: "dtx::runner_output", dir = %job.directory.display(), "{}", output.stdout);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::TestExplorer;
    use crate::results::TestOutcome;
    use crate::toolchain::{ProcessHandle, ProcessOutput};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Scripted stand-in for `dotnet`
    #[derive(Default)]
    struct FakeToolchain {
        listings: HashMap<PathBuf, Vec<String>>,
        failing_builds: HashSet<PathBuf>,
        /// Results each directory writes to its result file
        results: HashMap<PathBuf, Vec<(String, &'static str)>>,
        hang_runs: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeToolchain {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Toolchain for FakeToolchain {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn list_tests(&self, directory: &Path, _: &[String]) -> Result<ProcessOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("list {}", directory.display()));
            match self.listings.get(directory) {
                Some(names) => Ok(ProcessOutput::exited(
                    0,
                    format!("The following Tests are available:\n    {}\n", names.join("\n    ")),
                )),
                None => Ok(ProcessOutput::exited(1, "")),
            }
        }

        async fn build(&self, directory: &Path) -> Result<ProcessOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("build {}", directory.display()));
            if self.failing_builds.contains(directory) {
                Ok(ProcessOutput::exited(1, "error CS1002: ; expected"))
            } else {
                Ok(ProcessOutput::exited(0, "Build succeeded."))
            }
        }

        async fn run_tests(
            &self,
            request: RunRequest<'_>,
            mut cancel: CancelToken,
        ) -> Result<ProcessOutput> {
            self.calls.lock().unwrap().push(format!(
                "test {} {}",
                request.directory.display(),
                request.filter.unwrap_or("<all>")
            ));
            if self.hang_runs {
                cancel.cancelled().await;
                return Ok(ProcessOutput::killed());
            }
            let entries: Vec<(&str, &str)> = self
                .results
                .get(request.directory)
                .map(|rows| rows.iter().map(|(n, o)| (n.as_str(), *o)).collect())
                .unwrap_or_default();
            tokio::fs::write(request.result_file, trx(&entries)).await?;
            Ok(ProcessOutput::exited(0, "Passed!"))
        }

        async fn watch_tests(
            &self,
            directory: &Path,
            _: &Path,
            _: &[String],
        ) -> Result<ProcessHandle> {
            Ok(ProcessHandle::from_reader(
                &b"watch : Started\n"[..],
                directory,
            ))
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    fn trx(entries: &[(&str, &str)]) -> String {
        let rows: String = entries
            .iter()
            .enumerate()
            .map(|(i, (name, outcome))| {
                format!(
                    r#"<UnitTestResult testId="{}" testName="{}" outcome="{}" />"#,
                    i, name, outcome
                )
            })
            .collect();
        format!("<TestRun><Results>{}</Results></TestRun>", rows)
    }

    fn write_trx(dir: &Path, file: &str, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join(file);
        std::fs::write(&path, trx(entries)).unwrap();
        path
    }

    struct Fixture {
        orchestrator: Orchestrator,
        events: broadcast::Receiver<ExplorerEvent>,
        staging: TempDir,
    }

    impl Fixture {
        fn drain(&mut self) -> Vec<ExplorerEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                events.push(event);
            }
            events
        }
    }

    /// Orchestrator over `/work/A` and `/work/B` with tests already known
    fn fixture(directories: &[&str], config: ExplorerConfig) -> Fixture {
        let staging = TempDir::new().unwrap();
        let config = ExplorerConfig {
            result_staging_path: Some(staging.path().to_path_buf()),
            ..config
        };
        let mut tracked = TestDirectories::new(directories.iter().map(PathBuf::from).collect());
        for dir in directories {
            let ns = Path::new(dir).file_name().unwrap().to_string_lossy().to_string();
            tracked.add_tests_for_directory(
                Path::new(dir),
                &[format!("{}.Tests.T1", ns), format!("{}.Tests.T2", ns)],
            );
        }

        let toolchain: Arc<dyn Toolchain> = Arc::new(FakeToolchain::default());
        let (orchestrator, handle) = Orchestrator::new(config, Vec::new(), toolchain);
        let events = handle.subscribe();
        Fixture {
            orchestrator: orchestrator.with_directories(tracked),
            events,
            staging,
        }
    }

    #[tokio::test]
    async fn test_run_all_expects_every_directory() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::all()));

        let batch = f.orchestrator.batch();
        assert!(batch.is_open());
        assert_eq!(batch.expected_files(), 2);
        assert!(batch.clear_previous());
        assert_eq!(f.orchestrator.last_run(), Some(&TestFilter::all()));
        assert_eq!(f.drain(), vec![ExplorerEvent::RunStarted(TestFilter::all())]);
        assert!(f
            .orchestrator
            .result_dir()
            .unwrap()
            .starts_with(f.staging.path()));
    }

    #[tokio::test]
    async fn test_scoped_run_expects_one_file() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::prefix("B.Tests")));

        assert_eq!(f.orchestrator.batch().expected_files(), 1);
        assert!(!f.orchestrator.batch().clear_previous());
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        f.drain();

        f.orchestrator.handle(Message::Run(TestFilter::exact("A.Tests.T1")));
        assert_eq!(
            f.drain(),
            vec![ExplorerEvent::RunRejected {
                filter: TestFilter::exact("A.Tests.T1"),
                reason: RejectReason::AlreadyRunning,
            }]
        );
        assert_eq!(f.orchestrator.batch().expected_files(), 2);
    }

    #[tokio::test]
    async fn test_run_without_matching_directory() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::prefix("Missing")));

        assert!(!f.orchestrator.batch().is_open());
        assert_eq!(
            f.drain(),
            vec![ExplorerEvent::RunRejected {
                filter: TestFilter::prefix("Missing"),
                reason: RejectReason::NoMatchingDirectory,
            }]
        );
    }

    #[tokio::test]
    async fn test_run_rejected_during_discovery() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Discover);
        assert!(f.orchestrator.is_discovering());
        f.drain();

        f.orchestrator.handle(Message::Run(TestFilter::all()));
        assert!(matches!(
            f.drain().as_slice(),
            [ExplorerEvent::RunRejected {
                reason: RejectReason::Discovering,
                ..
            }]
        ));
    }

    #[tokio::test]
    async fn test_discovery_prunes_empty_directories() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Discover);
        assert_eq!(f.orchestrator.batch().directory_count(), 2);

        let found = vec![
            DiscoveredTests {
                directory: PathBuf::from("/work/A"),
                test_names: vec!["A.Tests.T1".to_string()],
            },
            DiscoveredTests::empty(Path::new("/work/B")),
        ];
        f.orchestrator.handle(Message::DiscoveryFinished(found));

        assert!(!f.orchestrator.is_discovering());
        assert_eq!(
            f.orchestrator.directories().test_directories(None),
            vec![PathBuf::from("/work/A")]
        );
        assert_eq!(f.orchestrator.batch().directory_count(), 1);
        let events = f.drain();
        assert_eq!(events[0], ExplorerEvent::DiscoveryStarted);
        match &events[1] {
            ExplorerEvent::DiscoveryFinished(found) => {
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].test_names, vec!["A.Tests.T1"]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_directory_completes_on_first_file() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        let files = TempDir::new().unwrap();
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        f.drain();

        let first = write_trx(files.path(), "0.trx", &[("A.Tests.T1", "Passed")]);
        f.orchestrator.handle(Message::ResultFile(first));
        assert!(!f.orchestrator.batch().is_open());

        let late = write_trx(files.path(), "1.trx", &[("A.Tests.T2", "Failed")]);
        f.orchestrator.handle(Message::ResultFile(late));
        assert!(!f.orchestrator.batch().is_open());

        let events = f.drain();
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (ExplorerEvent::NewResults(first), ExplorerEvent::NewResults(late)) => {
                assert!(first.clear_previous);
                assert_eq!(first.results[0].full_name, "A.Tests.T1");
                assert!(!late.clear_previous);
                assert_eq!(late.results[0].outcome, TestOutcome::Failed);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_waits_for_every_directory() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        let files = TempDir::new().unwrap();
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        f.drain();

        let a = write_trx(files.path(), "0.trx", &[("A.Tests.T1", "Passed")]);
        f.orchestrator.handle(Message::ResultFile(a));
        assert!(f.orchestrator.batch().is_open());
        assert!(f.drain().is_empty());

        let b = write_trx(files.path(), "1.trx", &[("B.Tests.T1", "Passed")]);
        f.orchestrator.handle(Message::ResultFile(b));
        assert!(!f.orchestrator.batch().is_open());
        match f.drain().as_slice() {
            [ExplorerEvent::NewResults(batch)] => {
                assert_eq!(batch.results.len(), 2);
                assert!(batch.clear_previous);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreadable_result_file_is_not_counted() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        let files = TempDir::new().unwrap();
        f.orchestrator.handle(Message::Run(TestFilter::all()));

        let broken = files.path().join("0.trx");
        std::fs::write(&broken, "<TestRun><Results>").unwrap();
        f.orchestrator.handle(Message::ResultFile(broken));
        assert_eq!(f.orchestrator.batch().current_files(), 0);
    }

    #[tokio::test]
    async fn test_missing_result_file_counts_as_empty() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        f.drain();

        let missing = f.staging.path().join("never-written.trx");
        f.orchestrator.handle(Message::RunFinished(Ok(vec![missing])));

        assert!(!f.orchestrator.batch().is_open());
        assert!(matches!(
            f.drain().as_slice(),
            [ExplorerEvent::NewResults(batch)] if batch.results.is_empty()
        ));
    }

    #[tokio::test]
    async fn test_previous_result_file_does_not_satisfy_next_run() {
        let mut f = fixture(&["/work/A", "/work/B"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        let dir = f.orchestrator.result_dir().unwrap().to_path_buf();
        let first = write_trx(&dir, "0.trx", &[("A.Tests.T1", "Passed")]);
        let second = write_trx(&dir, "1.trx", &[("B.Tests.T1", "Passed")]);
        f.orchestrator.handle(Message::ResultFile(first.clone()));
        f.orchestrator.handle(Message::ResultFile(second));
        assert!(!f.orchestrator.batch().is_open());
        f.drain();

        f.orchestrator.handle(Message::Run(TestFilter::exact("A.Tests.T2")));
        assert!(f.orchestrator.batch().is_open());
        assert!(!first.exists());

        // the run exits without writing its result file
        f.orchestrator.handle(Message::RunFinished(Ok(vec![first])));
        assert!(!f.orchestrator.batch().is_open());
        f.drain();

        f.orchestrator.handle(Message::Run(TestFilter::all()));
        assert_eq!(f.drain(), vec![ExplorerEvent::RunStarted(TestFilter::all())]);
    }

    #[tokio::test]
    async fn test_nested_class_leaf_can_be_run() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::DiscoveryFinished(vec![DiscoveredTests {
            directory: PathBuf::from("/work/A"),
            test_names: vec!["Ns.Outer+Inner.T3".to_string()],
        }]));
        let mut explorer = TestExplorer::new();
        for event in f.drain() {
            explorer.apply(&event);
        }

        let filter = explorer.filter_for("Ns.Outer+Inner.T3");
        assert_eq!(filter, TestFilter::exact("Ns.Outer.Inner.T3"));
        f.orchestrator.handle(Message::Run(filter.clone()));
        assert_eq!(f.drain(), vec![ExplorerEvent::RunStarted(filter)]);
    }

    #[tokio::test]
    async fn test_aborted_run_is_not_retried() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        f.drain();

        f.orchestrator.handle(Message::RunFinished(Err(Error::Aborted)));
        assert!(!f.orchestrator.batch().is_open());
        assert!(!f.orchestrator.is_discovering());
        assert_eq!(
            f.drain(),
            vec![ExplorerEvent::RunFailed {
                aborted: true,
                message: "Test run was aborted".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_run_error_triggers_discovery() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::Run(TestFilter::all()));
        f.drain();

        f.orchestrator.handle(Message::RunFinished(Err(Error::BuildFailed {
            directory: PathBuf::from("/work/A"),
        })));
        assert!(!f.orchestrator.batch().is_open());
        assert!(f.orchestrator.is_discovering());
        let events = f.drain();
        assert!(matches!(
            events.as_slice(),
            [
                ExplorerEvent::RunFailed { aborted: false, .. },
                ExplorerEvent::DiscoveryStarted
            ]
        ));
    }

    #[tokio::test]
    async fn test_rerun_last() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::RerunLast);
        assert!(f.drain().is_empty());

        let filter = TestFilter::exact("A.Tests.T2");
        f.orchestrator.handle(Message::Run(filter.clone()));
        f.orchestrator.handle(Message::RunFinished(Err(Error::Aborted)));
        f.drain();

        f.orchestrator.handle(Message::RerunLast);
        assert_eq!(f.drain(), vec![ExplorerEvent::RunStarted(filter)]);
    }

    #[tokio::test]
    async fn test_watch_trigger_marks_namespace_running() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        f.orchestrator.handle(Message::WatchTriggered("A".to_string()));

        assert_eq!(
            f.drain(),
            vec![ExplorerEvent::RunStarted(TestFilter::prefix("A"))]
        );
        assert!(!f.orchestrator.batch().is_open());
    }

    #[tokio::test]
    async fn test_shutdown_stops() {
        let mut f = fixture(&["/work/A"], ExplorerConfig::default());
        assert!(!f.orchestrator.handle(Message::Shutdown));
    }

    /// Project directory containing a buildable manifest
    fn project(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{}.csproj", name)), "<Project />").unwrap();
        dir
    }

    async fn wait_for<F>(
        orchestrator: &mut Orchestrator,
        events: &mut broadcast::Receiver<ExplorerEvent>,
        mut done: F,
    ) -> ExplorerEvent
    where
        F: FnMut(&ExplorerEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(20), async {
            loop {
                while let Ok(event) = events.try_recv() {
                    if done(&event) {
                        return event;
                    }
                }
                assert!(orchestrator.step().await);
            }
        })
        .await
        .unwrap()
    }

    /// Two projects with tests and one without, all under one workspace
    struct Workspace {
        root: TempDir,
        staging: TempDir,
        api: PathBuf,
        core: PathBuf,
        docs: PathBuf,
    }

    fn workspace() -> Workspace {
        let root = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let api = project(root.path(), "Api.Tests");
        let core = project(root.path(), "Core.Tests");
        let docs = project(root.path(), "Docs.Tests");
        Workspace {
            root,
            staging,
            api,
            core,
            docs,
        }
    }

    fn workspace_toolchain(ws: &Workspace) -> FakeToolchain {
        let mut listings = HashMap::new();
        listings.insert(
            ws.api.clone(),
            vec!["Api.Tests.Adds".to_string(), "Api.Tests.Subtracts".to_string()],
        );
        listings.insert(ws.core.clone(), vec!["Core.Tests.Parses".to_string()]);

        let mut results = HashMap::new();
        results.insert(
            ws.api.clone(),
            vec![
                ("Api.Tests.Adds".to_string(), "Passed"),
                ("Api.Tests.Subtracts".to_string(), "Failed"),
            ],
        );
        results.insert(
            ws.core.clone(),
            vec![("Core.Tests.Parses".to_string(), "Passed")],
        );

        FakeToolchain {
            listings,
            results,
            ..Default::default()
        }
    }

    fn workspace_orchestrator(
        ws: &Workspace,
        toolchain: Arc<FakeToolchain>,
        parallel: bool,
    ) -> (Orchestrator, OrchestratorHandle) {
        let config = ExplorerConfig {
            test_project_path: "*.Tests".to_string(),
            run_in_parallel: parallel,
            result_staging_path: Some(ws.staging.path().to_path_buf()),
            ..Default::default()
        };
        Orchestrator::new(config, vec![ws.root.path().to_path_buf()], toolchain)
    }

    /// Discover, run everything and return the surviving directories and results
    async fn discover_and_run(parallel: bool) -> (Vec<PathBuf>, Vec<(String, TestOutcome)>) {
        let ws = workspace();
        let toolchain = Arc::new(workspace_toolchain(&ws));
        let (mut orchestrator, handle) =
            workspace_orchestrator(&ws, Arc::clone(&toolchain), parallel);
        let mut events = handle.subscribe();

        handle.refresh().unwrap();
        let finished = wait_for(&mut orchestrator, &mut events, |e| {
            matches!(e, ExplorerEvent::DiscoveryFinished(_))
        })
        .await;
        assert!(matches!(finished, ExplorerEvent::DiscoveryFinished(found) if found.len() == 2));
        let directories = orchestrator.directories().test_directories(None);
        assert!(!directories.contains(&ws.docs));

        handle.run_all().unwrap();
        let batch = match wait_for(&mut orchestrator, &mut events, |e| {
            matches!(e, ExplorerEvent::NewResults(_))
        })
        .await
        {
            ExplorerEvent::NewResults(batch) => batch,
            other => panic!("unexpected event: {:?}", other),
        };
        assert!(batch.clear_previous);
        assert!(!orchestrator.batch().is_open());

        let calls = toolchain.calls();
        for dir in [&ws.api, &ws.core] {
            assert!(calls.contains(&format!("build {}", dir.display())));
            assert!(calls.contains(&format!("test {} <all>", dir.display())));
        }

        let names = directories
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().to_string())
            .map(PathBuf::from)
            .collect();
        let mut results: Vec<_> = batch
            .results
            .into_iter()
            .map(|r| (r.full_name, r.outcome))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        (names, results)
    }

    #[tokio::test]
    async fn test_discover_and_run_end_to_end() {
        let (directories, results) = discover_and_run(false).await;
        assert_eq!(
            directories,
            vec![PathBuf::from("Api.Tests"), PathBuf::from("Core.Tests")]
        );
        assert_eq!(
            results,
            vec![
                ("Api.Tests.Adds".to_string(), TestOutcome::Passed),
                ("Api.Tests.Subtracts".to_string(), TestOutcome::Failed),
                ("Core.Tests.Parses".to_string(), TestOutcome::Passed),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_matches_sequential() {
        let sequential = discover_and_run(false).await;
        let parallel = discover_and_run(true).await;
        assert_eq!(parallel, sequential);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_build_failure_spares_other_directories() {
        let ws = workspace();
        let mut toolchain = workspace_toolchain(&ws);
        toolchain.failing_builds.insert(ws.api.clone());
        let toolchain = Arc::new(toolchain);
        let (orchestrator, handle) = workspace_orchestrator(&ws, Arc::clone(&toolchain), true);

        let mut tracked = TestDirectories::new(vec![ws.api.clone(), ws.core.clone()]);
        tracked.add_tests_for_directory(&ws.api, &["Api.Tests.Adds".to_string()]);
        tracked.add_tests_for_directory(&ws.core, &["Core.Tests.Parses".to_string()]);
        let mut orchestrator = orchestrator.with_directories(tracked);
        let mut events = handle.subscribe();

        handle.run_all().unwrap();
        let failed = wait_for(&mut orchestrator, &mut events, |e| {
            matches!(e, ExplorerEvent::RunFailed { .. })
        })
        .await;
        assert!(matches!(failed, ExplorerEvent::RunFailed { aborted: false, .. }));

        let delivered = wait_for(&mut orchestrator, &mut events, |e| {
            matches!(e, ExplorerEvent::NewResults(batch)
                if batch.results.iter().any(|r| r.full_name == "Core.Tests.Parses"))
        })
        .await;
        match delivered {
            ExplorerEvent::NewResults(batch) => {
                assert!(!batch.clear_previous);
                assert_eq!(batch.results[0].outcome, TestOutcome::Passed);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let calls = toolchain.calls();
        assert!(calls.contains(&format!("build {}", ws.api.display())));
        assert!(!calls.contains(&format!("test {} <all>", ws.api.display())));
        assert!(calls.contains(&format!("test {} <all>", ws.core.display())));
    }

    #[tokio::test]
    async fn test_cancel_aborts_run() {
        let workspace = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let api = project(workspace.path(), "Api.Tests");
        let toolchain: Arc<dyn Toolchain> = Arc::new(FakeToolchain {
            hang_runs: true,
            ..Default::default()
        });
        let config = ExplorerConfig {
            skip_build: true,
            result_staging_path: Some(staging.path().to_path_buf()),
            ..Default::default()
        };
        let mut tracked = TestDirectories::new(vec![api.clone()]);
        tracked.add_tests_for_directory(&api, &["Api.Tests.Adds".to_string()]);
        let (orchestrator, handle) = Orchestrator::new(config, Vec::new(), toolchain);
        let mut orchestrator = orchestrator.with_directories(tracked);
        let mut events = handle.subscribe();

        handle.run(TestFilter::exact("Api.Tests.Adds")).unwrap();
        handle.cancel().unwrap();
        let failed = wait_for(&mut orchestrator, &mut events, |e| {
            matches!(e, ExplorerEvent::RunFailed { .. })
        })
        .await;

        assert_eq!(
            failed,
            ExplorerEvent::RunFailed {
                aborted: true,
                message: "Test run was aborted".to_string(),
            }
        );
        assert!(!orchestrator.is_discovering());
        assert!(!orchestrator.batch().is_open());
    }

    #[tokio::test]
    async fn test_auto_watch_after_discovery() {
        let mut f = fixture(
            &["/work/A"],
            ExplorerConfig {
                auto_watch: true,
                ..Default::default()
            },
        );
        f.orchestrator.handle(Message::DiscoveryFinished(vec![DiscoveredTests {
            directory: PathBuf::from("/work/A"),
            test_names: vec!["A.Tests.T1".to_string()],
        }]));
        assert!(f.orchestrator.watch_runner().is_watching(Path::new("/work/A")));
    }
}
