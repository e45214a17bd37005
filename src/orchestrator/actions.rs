//! Command handling: task mutations, project switching, document
//! generation, settings and exports.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use super::events::{Command, LoopEvent};
use super::machine::LoopOrchestrator;
use crate::config::{LoopSettings, Requirements};
use crate::history::{ExportFormat, HistoryExporter, ReportFormat, ReportPeriod};
use crate::prd;
use crate::ui::{LogLevel, UiMessage};
use crate::watcher::CreationWatcher;

/// Timestamp used in export file names.
fn export_stamp() -> String {
    Local::now().format("%Y%m%d-%H%M%S%3f").to_string()
}

impl LoopOrchestrator {
    /// Route a UI command to its transition.
    pub async fn dispatch(&mut self, command: Command) {
        debug!("Handling command {:?}", command);
        match command {
            Command::Start => self.start().await,
            Command::Stop => self.stop().await,
            Command::Pause => self.pause().await,
            Command::Resume => self.resume().await,
            Command::Next => self.run_single_step().await,
            Command::SkipTask => self.skip_current_task().await,
            Command::RetryTask => self.retry_failed_task().await,
            Command::CompleteAllTasks => self.complete_all_tasks().await,
            Command::ResetAllTasks => self.reset_all_tasks().await,
            Command::ReorderTasks(ids) => self.reorder_tasks(&ids).await,
            Command::GeneratePrd(description) => self.generate_prd(&description).await,
            Command::SwitchProject(root) => self.switch_project(root).await,
            Command::SettingsChanged(settings) => self.settings_changed(settings),
            Command::RequirementsChanged(requirements) => {
                self.requirements_changed(requirements);
            }
            Command::ExportData(format) => {
                self.export_data(format).await;
            }
            Command::ExportLog(entries) => {
                self.export_log(&entries).await;
            }
            Command::GenerateReport {
                period,
                format,
                start,
                end,
            } => {
                self.generate_report(period, format, start, end).await;
            }
        }
    }

    // ========================================================================
    // Task mutations
    // ========================================================================

    /// Skip the tracked task while running, otherwise the next actionable one.
    pub async fn skip_current_task(&mut self) {
        let tracked = if self.running {
            self.runner.current_task().map(|t| t.description.clone())
        } else {
            None
        };
        let skipped = match tracked {
            Some(description) => self.prd.skip_task(&description).await,
            None => self.prd.skip_next().await,
        };
        let Some(task) = skipped else {
            self.ui.log(LogLevel::Warning, "No task to skip");
            return;
        };

        self.progress
            .append(&format!("Skipped: {}", task.description))
            .await;
        self.ui
            .log(LogLevel::Info, format!("Skipped: {}", task.description));
        self.after_mutation().await;
    }

    /// Move the first blocked task back to pending.
    pub async fn retry_failed_task(&mut self) {
        let Some(task) = self.prd.retry_blocked().await else {
            self.ui.log(LogLevel::Info, "No blocked task to retry");
            return;
        };
        self.progress
            .append(&format!("Retrying: {}", task.description))
            .await;
        self.ui
            .log(LogLevel::Info, format!("Retrying: {}", task.description));
        self.after_mutation().await;
    }

    pub async fn complete_all_tasks(&mut self) {
        let Some(count) = self.prd.complete_all().await else {
            self.ui
                .log(LogLevel::Error, "Could not update the task document");
            return;
        };
        if count > 0 {
            self.progress
                .append(&format!("Marked {count} tasks complete"))
                .await;
        }
        self.ui
            .log(LogLevel::Info, format!("Marked {count} tasks complete"));
        self.after_mutation().await;
    }

    pub async fn reset_all_tasks(&mut self) {
        let Some(count) = self.prd.reset_all().await else {
            self.ui
                .log(LogLevel::Error, "Could not update the task document");
            return;
        };
        if count > 0 {
            self.progress.append(&format!("Reset {count} tasks")).await;
        }
        self.ui.log(LogLevel::Info, format!("Reset {count} tasks"));
        self.after_mutation().await;
    }

    /// Reorder tasks by id. Unknown or duplicate ids leave the document alone.
    pub async fn reorder_tasks(&mut self, ordered_ids: &[String]) {
        if !self.prd.reorder(ordered_ids).await {
            self.ui.log(LogLevel::Error, "Could not reorder tasks");
            return;
        }
        self.progress.append("Reordered tasks").await;
        self.ui.log(LogLevel::Info, "Reordered tasks");
        self.after_mutation().await;
    }

    /// Refresh stats; while idle also track the new next task for display.
    async fn after_mutation(&mut self) {
        let tasks = self.prd.tasks().await;
        if !self.running {
            self.runner
                .set_current_task(prd::next_task(&tasks).cloned());
        }
        self.publish(&tasks);
    }

    // ========================================================================
    // Project switching
    // ========================================================================

    /// Rebind to another project root in any state.
    ///
    /// A running loop keeps running on the new root; a paused one stays
    /// paused there.
    pub async fn switch_project(&mut self, root: PathBuf) {
        if root == self.root {
            debug!("Already on {}", root.display());
            return;
        }
        let was_running = self.running;
        let was_paused = self.paused;

        self.disable_prd_watcher();
        self.dispose_watchers();
        self.leave_waiting();
        self.cancel_countdown();

        info!("Switching project to {}", root.display());
        self.root = root;
        self.rebind_paths();
        self.runner.agent().set_working_dir(&self.root);
        self.runner.clear_history();
        self.runner.set_current_task(None);
        self.ui.highlight(
            LogLevel::Info,
            format!("Project: {}", self.root.display()),
        );

        if was_running {
            if let Err(e) = self.progress.ensure_exists().await {
                warn!("Cannot create progress log: {}", e);
            }
            let content = self.prd.read().await.unwrap_or_default();
            self.arm_watchers(content);
            if !self.prd.exists().await {
                self.notify(
                    LogLevel::Warning,
                    format!(
                        "No {} here yet; the loop continues once it is created",
                        self.settings.prd_file
                    ),
                );
                self.watch_for_document();
                self.refresh_status().await;
            } else if was_paused {
                self.inactivity.pause();
                self.refresh_status().await;
            } else {
                self.run_next_task().await;
            }
        } else {
            self.after_mutation().await;
        }
        self.ui.broadcast(UiMessage::Refresh);
    }

    // ========================================================================
    // Document generation
    // ========================================================================

    /// Ask the agent to write a task document from `description`.
    pub async fn generate_prd(&mut self, description: &str) {
        if self.prd.exists().await {
            self.notify(
                LogLevel::Warning,
                format!("{} already exists", self.settings.prd_file),
            );
            return;
        }
        let description = description.trim();
        if description.is_empty() {
            self.notify(LogLevel::Warning, "Describe the project first");
            return;
        }

        self.ui.broadcast(UiMessage::PrdGenerating);
        let prompt = self.prompts.prd_generation_prompt(description);
        if !self.runner.trigger_prd_generation(&prompt).await {
            self.ui.broadcast(UiMessage::PrdGenerated);
            self.notify(LogLevel::Error, "Failed to start task document generation");
            return;
        }

        self.watch_for_document();
    }

    fn watch_for_document(&mut self) {
        info!("Waiting for {}", self.prd.path().display());
        let tx = self.tx.clone();
        self.creation_watcher = Some(CreationWatcher::start(
            self.prd.path().to_path_buf(),
            move || {
                let _ = tx.send(LoopEvent::PrdCreated);
            },
        ));
    }

    /// A running loop that was waiting for its document picks up the first
    /// task; otherwise only the display is refreshed.
    pub(super) async fn on_prd_created(&mut self) {
        if let Some(mut watcher) = self.creation_watcher.take() {
            watcher.stop();
        }
        self.ui.broadcast(UiMessage::PrdGenerated);
        self.ui.highlight(
            LogLevel::Success,
            format!("{} created", self.settings.prd_file),
        );
        if self.running && !self.paused && !self.waiting {
            self.run_next_task().await;
        } else {
            self.after_mutation().await;
        }
        self.ui.broadcast(UiMessage::Refresh);
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Apply new settings. Document paths change only while idle.
    pub fn settings_changed(&mut self, settings: LoopSettings) {
        self.runner.set_max_iterations(settings.max_iterations);
        self.inactivity.set_durations(
            settings.inactivity_timeout(),
            settings.inactivity_check_interval(),
        );
        let paths_changed = settings.prd_file != self.settings.prd_file
            || settings.progress_file != self.settings.progress_file;
        self.settings = settings;
        self.prompts
            .set_requirements(self.settings.requirements.clone());

        if paths_changed {
            if self.running {
                self.ui.log(
                    LogLevel::Info,
                    "New document paths apply when the loop restarts",
                );
            } else {
                self.rebind_paths();
            }
        }
        info!(
            "Settings updated: max {} iterations, {}s countdown",
            self.settings.max_iterations, self.settings.countdown_seconds
        );
    }

    pub fn requirements_changed(&mut self, requirements: Requirements) {
        self.settings.requirements = requirements.clone();
        self.prompts.set_requirements(requirements);
        debug!("Requirements updated");
    }

    // ========================================================================
    // Exports
    // ========================================================================

    /// Export the completion history; returns the written file.
    pub async fn export_data(&self, format: ExportFormat) -> Option<PathBuf> {
        let records = match self.history.records_async().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Cannot read history: {}", e);
                self.ui.log(LogLevel::Error, format!("Export failed: {e}"));
                return None;
            }
        };
        let content = match HistoryExporter::export(&records, format) {
            Ok(content) => content,
            Err(e) => {
                warn!("History export failed: {}", e);
                self.ui.log(LogLevel::Error, format!("Export failed: {e}"));
                return None;
            }
        };
        let name = format!(
            "completion-history-{}.{}",
            export_stamp(),
            format.extension()
        );
        self.write_export(&name, &content).await
    }

    /// Save the UI's log lines.
    pub async fn export_log(&self, entries: &[String]) -> Option<PathBuf> {
        let content = HistoryExporter::render_log(entries);
        let name = format!("loop-log-{}.txt", export_stamp());
        self.write_export(&name, &content).await
    }

    /// Build and save a productivity report.
    pub async fn generate_report(
        &self,
        period: ReportPeriod,
        format: ReportFormat,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Option<PathBuf> {
        let report = match self
            .history
            .generate_report_async(period, start, end)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                self.notify(LogLevel::Error, format!("Cannot build report: {e}"));
                return None;
            }
        };
        let content = match HistoryExporter::render_report(&report, format) {
            Ok(content) => content,
            Err(e) => {
                warn!("Report rendering failed: {}", e);
                self.ui.log(LogLevel::Error, format!("Report failed: {e}"));
                return None;
            }
        };
        let name = format!(
            "productivity-report-{}-{}.{}",
            period,
            export_stamp(),
            format.extension()
        );
        self.write_export(&name, &content).await
    }

    async fn write_export(&self, name: &str, content: &str) -> Option<PathBuf> {
        let dir = LoopSettings::export_dir(&self.root);
        let path = dir.join(name);
        match write_file(&dir, &path, content).await {
            Ok(()) => {
                info!("Exported {}", path.display());
                self.ui.highlight(
                    LogLevel::Success,
                    format!("Saved {}", path.display()),
                );
                Some(path)
            }
            Err(e) => {
                warn!("Cannot write {}: {}", path.display(), e);
                self.ui
                    .log(LogLevel::Error, format!("Cannot write {}", path.display()));
                None
            }
        }
    }
}

async fn write_file(dir: &Path, path: &Path, content: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, content).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::history::HistoryStore;
    use crate::testing::{MockAgent, MockPrompter, RecordingSink, TestProject};
    use crate::ui::{LoopStatus, UiBroadcaster};

    fn orchestrator(project: &TestProject) -> (Arc<MockAgent>, Arc<MockPrompter>, Arc<RecordingSink>, LoopOrchestrator) {
        let agent = Arc::new(MockAgent::new());
        let prompter = Arc::new(MockPrompter::new());
        let sink = Arc::new(RecordingSink::new());
        let orch = LoopOrchestrator::new(
            project.path(),
            LoopSettings::default(),
            agent.clone(),
            prompter.clone(),
        )
        .with_history(HistoryStore::new(project.history_path()))
        .with_ui(UiBroadcaster::new().with_sink(sink.clone()));
        (agent, prompter, sink, orch)
    }

    #[tokio::test]
    async fn test_skip_while_idle_updates_display() {
        let project = TestProject::three_tasks();
        let (_, _, sink, mut orch) = orchestrator(&project);

        orch.dispatch(Command::SkipTask).await;

        assert!(project.read_prd().contains("- [s] Task 1"));
        assert!(project.read_progress().contains("Skipped: Task 1"));
        assert_eq!(orch.current_task().unwrap().description, "Task 2");
        assert_eq!(sink.last_status(), Some((LoopStatus::Idle, 0)));
    }

    #[tokio::test]
    async fn test_retry_blocked_task() {
        let project = TestProject::with_prd("- [x] A\n- [!] B\n- [ ] C\n");
        let (_, _, _, mut orch) = orchestrator(&project);

        orch.retry_failed_task().await;

        assert_eq!(project.read_prd(), "- [x] A\n- [ ] B\n- [ ] C\n");
        assert_eq!(orch.current_task().unwrap().description, "B");
        assert!(project.read_progress().contains("Retrying: B"));
    }

    #[tokio::test]
    async fn test_retry_without_blocked_task() {
        let project = TestProject::three_tasks();
        let (_, _, sink, mut orch) = orchestrator(&project);
        orch.retry_failed_task().await;
        assert_eq!(project.read_prd(), TestProject::three_task_content());
        assert_eq!(sink.logs(), vec!["No blocked task to retry"]);
    }

    #[tokio::test]
    async fn test_complete_and_reset_all() {
        let project = TestProject::three_tasks();
        let (_, _, _, mut orch) = orchestrator(&project);

        orch.complete_all_tasks().await;
        assert!(!project.read_prd().contains("- [ ]"));
        assert!(orch.current_task().is_none());

        orch.reset_all_tasks().await;
        assert_eq!(project.read_prd(), TestProject::three_task_content());
        assert_eq!(orch.current_task().unwrap().description, "Task 1");

        let progress = project.read_progress();
        assert!(progress.contains("Marked 3 tasks complete"));
        assert!(progress.contains("Reset 3 tasks"));
    }

    #[tokio::test]
    async fn test_reorder_tasks() {
        let project = TestProject::three_tasks();
        let (_, _, _, mut orch) = orchestrator(&project);

        let ids = vec!["task-5".to_string(), "task-3".to_string(), "task-4".to_string()];
        orch.reorder_tasks(&ids).await;

        assert_eq!(
            project.read_prd(),
            "# Plan\n\n- [ ] Task 3\n- [ ] Task 1\n- [ ] Task 2\n"
        );
        assert_eq!(orch.current_task().unwrap().description, "Task 3");
    }

    #[tokio::test]
    async fn test_reorder_rejects_unknown_id() {
        let project = TestProject::three_tasks();
        let (_, _, _, mut orch) = orchestrator(&project);

        orch.reorder_tasks(&["task-99".to_string()]).await;

        assert_eq!(project.read_prd(), TestProject::three_task_content());
        assert!(project.read_progress().is_empty());
    }

    #[tokio::test]
    async fn test_switch_project_while_idle() {
        let first = TestProject::three_tasks();
        let second = TestProject::with_prd("- [x] Old\n- [ ] Fresh\n");
        let (_, _, sink, mut orch) = orchestrator(&first);

        orch.switch_project(second.path().to_path_buf()).await;

        assert_eq!(orch.root(), second.path());
        assert_eq!(orch.current_task().unwrap().description, "Fresh");
        assert!(!orch.is_running());
        assert_eq!(sink.messages().last(), Some(&UiMessage::Refresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_project_while_running() {
        let first = TestProject::three_tasks();
        let second = TestProject::with_prd("- [ ] Fresh\n");
        let (agent, _, _, mut orch) = orchestrator(&first);

        orch.start().await;
        orch.switch_project(second.path().to_path_buf()).await;

        assert!(orch.is_running());
        assert_eq!(orch.status(), LoopStatus::Waiting);
        assert_eq!(orch.iteration(), 2);
        assert_eq!(orch.current_task().unwrap().description, "Fresh");
        assert!(orch.runner().task_history().is_empty());
        assert!(agent.prompts()[1].contains("Fresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_to_project_without_document_waits_for_it() {
        let first = TestProject::three_tasks();
        let second = TestProject::empty();
        let (agent, prompter, _, mut orch) = orchestrator(&first);

        orch.start().await;
        orch.switch_project(second.path().to_path_buf()).await;

        assert!(orch.is_running());
        assert_eq!(orch.status(), LoopStatus::Running);
        assert_eq!(agent.call_count(), 1);
        assert!(orch.creation_watcher.is_some());
        assert!(prompter
            .notices()
            .iter()
            .any(|(level, m)| *level == LogLevel::Warning && m.contains("No PRD.md here yet")));

        second.write_prd("- [ ] Arrived\n");
        orch.handle_event(LoopEvent::PrdCreated).await;

        assert!(orch.creation_watcher.is_none());
        assert_eq!(orch.status(), LoopStatus::Waiting);
        assert_eq!(agent.call_count(), 2);
        assert!(agent.prompts()[1].contains("Arrived"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_project_stays_paused() {
        let first = TestProject::three_tasks();
        let second = TestProject::with_prd("- [ ] Fresh\n");
        let (agent, _, _, mut orch) = orchestrator(&first);

        orch.start().await;
        orch.pause().await;
        orch.switch_project(second.path().to_path_buf()).await;

        assert_eq!(orch.status(), LoopStatus::Paused);
        assert_eq!(agent.call_count(), 1);

        orch.resume().await;
        assert_eq!(orch.current_task().unwrap().description, "Fresh");
    }

    #[tokio::test]
    async fn test_generate_prd_refuses_existing_document() {
        let project = TestProject::three_tasks();
        let (agent, prompter, _, mut orch) = orchestrator(&project);

        orch.generate_prd("A todo app").await;

        assert!(agent.generation_prompts().is_empty());
        assert_eq!(
            prompter.notices(),
            vec![(LogLevel::Warning, "PRD.md already exists".to_string())]
        );
    }

    #[tokio::test]
    async fn test_generate_prd_shows_and_hides_indicator() {
        let project = TestProject::empty();
        let (agent, _, sink, mut orch) = orchestrator(&project);

        orch.generate_prd("A todo app").await;
        assert_eq!(agent.generation_prompts().len(), 1);
        assert!(agent.generation_prompts()[0].contains("A todo app"));
        assert!(sink.messages().contains(&UiMessage::PrdGenerating));
        assert!(orch.creation_watcher.is_some());

        project.write_prd("- [ ] Generated\n");
        orch.handle_event(LoopEvent::PrdCreated).await;

        assert!(orch.creation_watcher.is_none());
        assert!(sink.messages().contains(&UiMessage::PrdGenerated));
        assert_eq!(orch.current_task().unwrap().description, "Generated");
    }

    #[tokio::test]
    async fn test_generate_prd_agent_failure_hides_indicator() {
        let project = TestProject::empty();
        let agent = Arc::new(MockAgent::new().with_error("not installed"));
        let sink = Arc::new(RecordingSink::new());
        let mut orch = LoopOrchestrator::new(
            project.path(),
            LoopSettings::default(),
            agent,
            Arc::new(MockPrompter::new()),
        )
        .with_history(HistoryStore::new(project.history_path()))
        .with_ui(UiBroadcaster::new().with_sink(sink.clone()));

        orch.generate_prd("A todo app").await;

        let messages = sink.messages();
        assert!(messages.contains(&UiMessage::PrdGenerating));
        assert!(messages.contains(&UiMessage::PrdGenerated));
        assert!(orch.creation_watcher.is_none());
    }

    #[tokio::test]
    async fn test_settings_and_requirements_changed() {
        let project = TestProject::three_tasks();
        let (agent, _, _, mut orch) = orchestrator(&project);

        orch.settings_changed(LoopSettings {
            max_iterations: 7,
            ..LoopSettings::default()
        });
        assert_eq!(orch.runner().max_iterations(), 7);

        orch.requirements_changed(Requirements {
            lint: true,
            ..Requirements::default()
        });
        assert!(orch.settings().requirements.lint);

        orch.run_single_step().await;
        assert!(agent.prompts()[0].contains("lint"));
    }

    #[tokio::test]
    async fn test_export_data_writes_json() {
        let project = TestProject::three_tasks();
        let (_, _, _, orch) = orchestrator(&project);

        let path = orch.export_data(ExportFormat::Json).await.unwrap();

        assert!(path.starts_with(LoopSettings::export_dir(project.path())));
        assert_eq!(path.extension().unwrap(), "json");
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_array() || parsed.is_object());
    }

    #[tokio::test]
    async fn test_export_log() {
        let project = TestProject::three_tasks();
        let (_, _, _, orch) = orchestrator(&project);

        let entries = vec!["first".to_string(), "second".to_string()];
        let path = orch.export_log(&entries).await.unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("first"));
        assert!(content.contains("second"));
    }

    #[tokio::test]
    async fn test_report_with_incomplete_custom_range() {
        let project = TestProject::three_tasks();
        let (_, prompter, _, orch) = orchestrator(&project);

        let written = orch
            .generate_report(ReportPeriod::Custom, ReportFormat::Markdown, None, None)
            .await;

        assert!(written.is_none());
        assert_eq!(prompter.notices()[0].0, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_report_markdown_written() {
        let project = TestProject::three_tasks();
        let (_, _, _, orch) = orchestrator(&project);

        let path = orch
            .generate_report(ReportPeriod::Week, ReportFormat::Markdown, None, None)
            .await
            .unwrap();

        assert_eq!(path.extension().unwrap(), "md");
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("productivity-report-week-"));
    }
}
