//! The loop state machine.
//!
//! `LoopOrchestrator` owns every component and reacts to [`LoopEvent`]s one
//! at a time. Timers and watchers never call back into it directly; they
//! send events through its channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::events::{LoopEvent, LoopHandle};
use crate::config::LoopSettings;
use crate::history::{format_duration_ms, HistoryStore};
use crate::prd::{self, PrdDocument, Task, TaskStats};
use crate::progress_log::ProgressLog;
use crate::prompt::PromptBuilder;
use crate::runner::TaskRunner;
use crate::testing::{AgentInvoker, InactivityChoice, InactivityPrompter};
use crate::timers::{CountdownTimer, InactivityMonitor};
use crate::ui::{LogLevel, LoopStatus, TaskInfo, UiBroadcaster, UiMessage};
use crate::watcher::{ActivityWatcher, CreationWatcher, PrdWatcher};

/// Drives the agent through the task document, one task at a time.
///
/// States are idle and running, with a paused overlay and a waiting
/// sub-phase while the agent works on a task. No public transition returns
/// an error: failures are logged and leave the state where it was.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use prdloop::config::LoopSettings;
/// use prdloop::orchestrator::{Command, LoopOrchestrator};
/// use prdloop::runner::CommandAgent;
/// use prdloop::testing::MockPrompter;
///
/// # async fn demo() {
/// let settings = LoopSettings::default();
/// let agent = Arc::new(CommandAgent::new(settings.agent.clone(), "."));
/// let mut orchestrator =
///     LoopOrchestrator::new(".", settings, agent, Arc::new(MockPrompter::new()));
/// orchestrator.handle().send(Command::Start);
/// orchestrator.run().await;
/// # }
/// ```
pub struct LoopOrchestrator {
    pub(super) root: PathBuf,
    pub(super) settings: LoopSettings,
    pub(super) prd: PrdDocument,
    pub(super) progress: ProgressLog,
    pub(super) runner: TaskRunner,
    pub(super) history: HistoryStore,
    pub(super) prompts: PromptBuilder,
    pub(super) ui: UiBroadcaster,
    pub(super) prompter: Arc<dyn InactivityPrompter>,
    pub(super) countdown: CountdownTimer,
    pub(super) countdown_generation: u64,
    pub(super) inactivity: InactivityMonitor,
    pub(super) prd_watcher: Option<PrdWatcher>,
    pub(super) activity_watcher: Option<ActivityWatcher>,
    pub(super) creation_watcher: Option<CreationWatcher>,
    pub(super) running: bool,
    pub(super) paused: bool,
    pub(super) waiting: bool,
    pub(super) prompt_pending: bool,
    pub(super) session_start: Option<DateTime<Utc>>,
    pub(super) tx: UnboundedSender<LoopEvent>,
    rx: UnboundedReceiver<LoopEvent>,
}

impl std::fmt::Debug for LoopOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopOrchestrator")
            .field("root", &self.root)
            .field("status", &self.status())
            .field("runner", &self.runner)
            .finish()
    }
}

impl LoopOrchestrator {
    /// Create an idle orchestrator for the project at `root`.
    ///
    /// History goes to the per-user default location unless replaced with
    /// [`with_history`](Self::with_history).
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        settings: LoopSettings,
        agent: Arc<dyn AgentInvoker>,
        prompter: Arc<dyn InactivityPrompter>,
    ) -> Self {
        let root = root.into();
        let (tx, rx) = mpsc::unbounded_channel();
        agent.set_working_dir(&root);

        Self {
            prd: PrdDocument::new(settings.prd_path(&root)),
            progress: ProgressLog::new(settings.progress_path(&root)),
            runner: TaskRunner::new(agent, settings.max_iterations),
            history: HistoryStore::at_default_location(),
            prompts: PromptBuilder::new(
                settings.prd_file.clone(),
                settings.progress_file.clone(),
                settings.requirements.clone(),
            ),
            ui: UiBroadcaster::new(),
            prompter,
            countdown: CountdownTimer::new(),
            countdown_generation: 0,
            inactivity: InactivityMonitor::new(
                settings.inactivity_timeout(),
                settings.inactivity_check_interval(),
            ),
            prd_watcher: None,
            activity_watcher: None,
            creation_watcher: None,
            running: false,
            paused: false,
            waiting: false,
            prompt_pending: false,
            session_start: None,
            tx,
            rx,
            root,
            settings,
        }
    }

    /// Use a specific history store.
    #[must_use]
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = history;
        self
    }

    /// Use a specific set of UI sinks.
    #[must_use]
    pub fn with_ui(mut self, ui: UiBroadcaster) -> Self {
        self.ui = ui;
        self
    }

    /// Sender for commands from UI surfaces.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle::new(self.tx.clone())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    #[must_use]
    pub fn status(&self) -> LoopStatus {
        if !self.running {
            LoopStatus::Idle
        } else if self.paused {
            LoopStatus::Paused
        } else if self.waiting {
            LoopStatus::Waiting
        } else {
            LoopStatus::Running
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn iteration(&self) -> u32 {
        self.runner.iteration()
    }

    #[must_use]
    pub fn current_task(&self) -> Option<&Task> {
        self.runner.current_task()
    }

    #[must_use]
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Process events until shutdown.
    pub async fn run(&mut self) {
        while self.step().await {}
        debug!("Orchestrator event loop finished");
    }

    /// Wait for and process one event. Returns `false` after shutdown.
    pub async fn step(&mut self) -> bool {
        let Some(event) = self.rx.recv().await else {
            return false;
        };
        if matches!(event, LoopEvent::Shutdown) {
            self.stop().await;
            return false;
        }
        self.handle_event(event).await;
        true
    }

    pub async fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Command(command) => self.dispatch(command).await,
            LoopEvent::PrdChanged(content) => self.handle_prd_change(content).await,
            LoopEvent::Activity => self.inactivity.record_activity(),
            LoopEvent::InactivityTimeout => self.handle_inactivity(),
            LoopEvent::InactivityAnswer { task, choice } => {
                self.apply_inactivity_choice(&task, choice).await;
            }
            LoopEvent::CountdownTick {
                generation,
                remaining,
            } => self.on_countdown_tick(generation, remaining).await,
            LoopEvent::PrdCreated => self.on_prd_created().await,
            LoopEvent::Shutdown => self.stop().await,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin a session and hand the first task to the agent.
    pub async fn start(&mut self) {
        if self.running {
            self.ui.log(LogLevel::Info, "Loop is already running");
            return;
        }

        self.rebind_paths();
        let Some(content) = self.prd.read().await else {
            self.notify(
                LogLevel::Warning,
                format!("No task document at {}", self.prd.path().display()),
            );
            return;
        };
        let tasks = prd::parse(&content);
        let pending = TaskStats::from_tasks(&tasks).actionable();
        if pending == 0 {
            self.notify(LogLevel::Info, "No pending tasks");
            return;
        }

        let session_id = self.history.start_session();
        self.session_start = Some(Utc::now());
        if let Err(e) = self.progress.ensure_exists().await {
            warn!(
                "Cannot create progress log {}: {}",
                self.progress.path().display(),
                e
            );
        }
        self.runner.reset_iterations();
        self.runner.clear_history();
        self.runner.set_current_task(None);

        self.running = true;
        self.paused = false;
        self.waiting = false;
        self.arm_watchers(content);

        info!("Loop started ({}), {} tasks pending", session_id, pending);
        self.ui
            .highlight(LogLevel::Info, format!("Loop started: {pending} tasks pending"));
        self.broadcast_timing(pending);
        self.run_next_task().await;
    }

    /// Hand the next actionable task to the agent and start waiting.
    pub async fn run_next_task(&mut self) {
        if !self.running || self.paused {
            debug!("Not advancing: running={} paused={}", self.running, self.paused);
            return;
        }

        let Some(content) = self.prd.read().await else {
            self.ui.log(LogLevel::Error, "Cannot read the task document");
            return;
        };
        let tasks = prd::parse(&content);

        let Some(next) = prd::next_task(&tasks).cloned() else {
            info!("All tasks complete");
            self.progress.append("All tasks complete").await;
            self.ui.highlight(LogLevel::Success, "All tasks complete");
            self.prompter.notify(LogLevel::Success, "All tasks complete");
            self.stop().await;
            return;
        };

        if !self.runner.check_iteration_limit() {
            let message = format!(
                "Iteration limit reached ({})",
                self.runner.max_iterations()
            );
            self.progress.append(&message).await;
            self.notify(LogLevel::Warning, message);
            self.stop().await;
            return;
        }

        let iteration = self.runner.increment_iteration();
        info!("Iteration {}: {}", iteration, next.description);
        let prompt = self.prompts.task_prompt(&next);
        self.ui.log(
            LogLevel::Info,
            format!("Iteration {iteration}: {}", next.description),
        );
        self.runner.set_current_task(Some(next));
        if !self.runner.trigger_agent(&prompt).await {
            self.ui.log(LogLevel::Error, "Failed to start the agent");
        }

        self.waiting = true;
        self.arm_inactivity();
        if let Some(watcher) = &self.prd_watcher {
            watcher.update_content(content);
            watcher.enable();
            watcher.refresh().await;
        }
        self.publish(&tasks);
    }

    /// React to an edited task document.
    ///
    /// A different next task means the current one finished. An unchanged
    /// next task is treated as an unrelated edit.
    pub async fn handle_prd_change(&mut self, content: String) {
        self.disable_prd_watcher();
        if !self.running || self.paused || !self.waiting {
            debug!("Ignoring document change outside the waiting phase");
            return;
        }

        let tasks = prd::parse(&content);
        let unchanged = match (prd::next_task(&tasks), self.runner.current_task()) {
            (Some(next), Some(current)) => next.description == current.description,
            _ => false,
        };
        if unchanged {
            debug!("Document changed but the current task did not");
            if let Some(watcher) = &self.prd_watcher {
                watcher.enable();
            }
            self.ui
                .broadcast(UiMessage::Stats(TaskStats::from_tasks(&tasks)));
            return;
        }

        self.leave_waiting();
        if let Some(watcher) = &self.prd_watcher {
            watcher.update_content(content);
        }

        if let Some(done) = self.runner.record_task_completion() {
            let session_id = self.history.session_id().unwrap_or_default().to_string();
            if let Err(e) = self
                .history
                .record_completion_async(done.clone(), session_id, Some(self.root.clone()))
                .await
            {
                warn!("Failed to record completion: {}", e);
            }
            self.progress
                .append(&format!("Completed: {}", done.description))
                .await;
            info!("Completed '{}'", done.description);
            self.ui.highlight(
                LogLevel::Success,
                format!(
                    "Completed: {} ({})",
                    done.description,
                    format_duration_ms(done.duration_ms)
                ),
            );
            self.ui.broadcast(UiMessage::History {
                completions: self.runner.task_history().to_vec(),
            });
        }
        self.runner.set_current_task(None);

        self.broadcast_timing(TaskStats::from_tasks(&tasks).actionable());
        self.publish(&tasks);
        self.start_countdown();
    }

    /// The agent went quiet: ask the user, off the event loop.
    pub fn handle_inactivity(&mut self) {
        if !self.running || self.paused || !self.waiting || self.prompt_pending {
            return;
        }
        let Some(task) = self.runner.current_task().map(|t| t.description.clone()) else {
            return;
        };

        self.prompt_pending = true;
        warn!("No activity while working on '{}'", task);
        self.ui.highlight(
            LogLevel::Warning,
            format!(
                "No activity for {}s on: {task}",
                self.inactivity.timeout().as_secs()
            ),
        );

        let prompter = Arc::clone(&self.prompter);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let choice = prompter.ask(&task).await;
            let _ = tx.send(LoopEvent::InactivityAnswer { task, choice });
        });
    }

    /// Apply the answer to an inactivity prompt. A dismissed prompt keeps
    /// waiting. Answers about a task that is no longer current are dropped.
    pub async fn apply_inactivity_choice(&mut self, task: &str, choice: Option<InactivityChoice>) {
        self.prompt_pending = false;
        let current = self
            .runner
            .current_task()
            .is_some_and(|t| t.description == task);
        if !self.running || self.paused || !self.waiting || !current {
            debug!("Dropping stale inactivity answer for '{}'", task);
            return;
        }

        let choice = choice.unwrap_or(InactivityChoice::Continue);
        info!("Inactivity answer for '{}': {}", task, choice);
        match choice {
            InactivityChoice::Continue => {
                self.ui.log(LogLevel::Info, "Continuing to wait");
                self.arm_inactivity();
            }
            InactivityChoice::Retry => {
                self.disable_prd_watcher();
                self.leave_waiting();
                self.ui.log(LogLevel::Info, format!("Retrying: {task}"));
                self.run_next_task().await;
            }
            InactivityChoice::Skip => {
                self.disable_prd_watcher();
                self.leave_waiting();
                if self.prd.skip_task(task).await.is_some() {
                    self.progress.append(&format!("Skipped: {task}")).await;
                    self.ui.log(LogLevel::Info, format!("Skipped: {task}"));
                } else {
                    warn!("Could not mark '{}' skipped", task);
                }
                self.runner.set_current_task(None);

                let content = self.prd.read().await;
                if let (Some(watcher), Some(content)) = (&self.prd_watcher, content) {
                    watcher.update_content(content);
                }
                self.refresh_status().await;
                self.start_countdown();
            }
            InactivityChoice::Stop => self.stop().await,
        }
    }

    /// Suspend without losing the iteration or current task.
    pub async fn pause(&mut self) {
        if !self.running || self.paused {
            self.ui.log(LogLevel::Info, "Loop is not running");
            return;
        }
        self.paused = true;
        self.disable_prd_watcher();
        self.inactivity.pause();
        self.cancel_countdown();

        info!("Loop paused at iteration {}", self.runner.iteration());
        self.ui.highlight(LogLevel::Info, "Loop paused");
        self.refresh_status().await;
    }

    /// Leave the pause and re-enter the task loop from the top.
    pub async fn resume(&mut self) {
        if !self.running || !self.paused {
            self.ui.log(LogLevel::Info, "Loop is not paused");
            return;
        }
        self.paused = false;
        self.inactivity.resume();

        info!("Loop resumed");
        self.ui.highlight(LogLevel::Info, "Loop resumed");
        self.run_next_task().await;
    }

    /// Stop from any state. The agent, if working, is left alone.
    pub async fn stop(&mut self) {
        let was_running = self.running;
        self.running = false;
        self.paused = false;
        self.dispose_watchers();
        self.leave_waiting();
        self.cancel_countdown();

        if was_running {
            info!("Loop stopped after {} iterations", self.runner.iteration());
            self.ui.highlight(LogLevel::Info, "Loop stopped");
        }
        self.refresh_status().await;
    }

    /// Run exactly one task without arming the loop.
    pub async fn run_single_step(&mut self) {
        if self.running {
            self.notify(LogLevel::Info, "Stop the loop before running a single task");
            return;
        }

        self.rebind_paths();
        let Some(content) = self.prd.read().await else {
            self.notify(
                LogLevel::Warning,
                format!("No task document at {}", self.prd.path().display()),
            );
            return;
        };
        let tasks = prd::parse(&content);
        let Some(next) = prd::next_task(&tasks).cloned() else {
            self.notify(LogLevel::Info, "No pending tasks");
            return;
        };
        if !self.runner.check_iteration_limit() {
            self.notify(
                LogLevel::Warning,
                format!("Iteration limit reached ({})", self.runner.max_iterations()),
            );
            return;
        }

        let iteration = self.runner.increment_iteration();
        let prompt = self.prompts.task_prompt(&next);
        self.ui.log(
            LogLevel::Info,
            format!("Single step {iteration}: {}", next.description),
        );
        self.runner.set_current_task(Some(next));
        if !self.runner.trigger_agent(&prompt).await {
            self.ui.log(LogLevel::Error, "Failed to start the agent");
        }
        self.publish(&tasks);
    }

    async fn on_countdown_tick(&mut self, generation: u64, remaining: u32) {
        if generation != self.countdown_generation {
            debug!("Ignoring tick from cancelled countdown {}", generation);
            return;
        }
        self.ui.broadcast(UiMessage::Countdown { seconds: remaining });
        if remaining == 0 {
            self.run_next_task().await;
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Point the document, log and prompts at the current root and settings.
    pub(super) fn rebind_paths(&mut self) {
        self.prd = PrdDocument::new(self.settings.prd_path(&self.root));
        self.progress = ProgressLog::new(self.settings.progress_path(&self.root));
        self.prompts = PromptBuilder::new(
            self.settings.prd_file.clone(),
            self.settings.progress_file.clone(),
            self.settings.requirements.clone(),
        );
    }

    pub(super) fn arm_watchers(&mut self, content: String) {
        let tx = self.tx.clone();
        self.prd_watcher = Some(PrdWatcher::start(
            self.prd.path().to_path_buf(),
            content,
            move |changed| {
                let _ = tx.send(LoopEvent::PrdChanged(changed));
            },
        ));
        let tx = self.tx.clone();
        self.activity_watcher = Some(ActivityWatcher::start(self.root.clone(), move || {
            let _ = tx.send(LoopEvent::Activity);
        }));
    }

    pub(super) fn dispose_watchers(&mut self) {
        if let Some(mut watcher) = self.prd_watcher.take() {
            watcher.stop();
        }
        if let Some(mut watcher) = self.activity_watcher.take() {
            watcher.stop();
        }
        if let Some(mut watcher) = self.creation_watcher.take() {
            watcher.stop();
        }
    }

    pub(super) fn disable_prd_watcher(&self) {
        if let Some(watcher) = &self.prd_watcher {
            watcher.disable();
        }
    }

    fn arm_inactivity(&mut self) {
        self.inactivity.set_waiting(true);
        let tx = self.tx.clone();
        self.inactivity.start(move || {
            let _ = tx.send(LoopEvent::InactivityTimeout);
        });
    }

    pub(super) fn leave_waiting(&mut self) {
        self.waiting = false;
        self.inactivity.stop();
        self.inactivity.set_waiting(false);
    }

    fn start_countdown(&mut self) {
        self.countdown_generation += 1;
        let generation = self.countdown_generation;
        let seconds = self.settings.countdown_seconds;
        let tx = self.tx.clone();
        info!("Next task in {}s", seconds);
        let _ = self.countdown.start(seconds, move |remaining| {
            let _ = tx.send(LoopEvent::CountdownTick {
                generation,
                remaining,
            });
        });
    }

    pub(super) fn cancel_countdown(&mut self) {
        self.countdown.stop();
        self.countdown_generation += 1;
        self.ui.broadcast(UiMessage::Countdown { seconds: 0 });
    }

    /// Show a transient notice and log it.
    pub(super) fn notify(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        self.prompter.notify(level, &message);
        self.ui.log(level, message);
    }

    /// Broadcast status and stats for `tasks`.
    pub(super) fn publish(&self, tasks: &[Task]) {
        let task = self
            .runner
            .current_task()
            .map(|current| TaskInfo::new(current, tasks));
        self.ui.broadcast(UiMessage::Status {
            status: self.status(),
            iteration: self.runner.iteration(),
            task,
        });
        self.ui
            .broadcast(UiMessage::Stats(TaskStats::from_tasks(tasks)));
    }

    pub(super) async fn refresh_status(&self) {
        let tasks = self.prd.tasks().await;
        self.publish(&tasks);
    }

    fn broadcast_timing(&self, pending: usize) {
        self.ui.broadcast(UiMessage::SessionTiming {
            start: self.session_start,
            completions: self.runner.task_history().to_vec(),
            pending,
        });
    }
}
