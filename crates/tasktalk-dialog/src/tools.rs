//! Task backend seam and the executor that turns finished commands into
//! backend calls.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tasktalk_core::Timestamp;

use crate::error::ToolError;
use crate::types::{slot, ActionKind, Priority, TaskStatus};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub owner: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
    pub status: TaskStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub deadline: Option<NaiveDate>,
}

/// A single-field change. Only the `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub deadline: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
}

impl TaskUpdate {
    /// Build an update from a canonical field name and its raw value.
    pub fn from_field(field: &str, value: &str) -> Result<Self, ToolError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ToolError::InvalidParameters(format!("{} is blank", field)));
        }
        let mut update = TaskUpdate::default();
        match field {
            "title" => update.title = Some(value.to_string()),
            "description" => update.description = Some(value.to_string()),
            "priority" => {
                update.priority = Some(value.parse().map_err(ToolError::InvalidParameters)?)
            }
            "deadline" => update.deadline = Some(parse_date(value)?),
            "status" => update.status = Some(value.parse().map_err(ToolError::InvalidParameters)?),
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "Unknown task field: {}",
                    other
                )))
            }
        }
        Ok(update)
    }

    pub fn is_empty(&self) -> bool {
        self == &TaskUpdate::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub owner: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn for_owner(owner: &str) -> Self {
        Self {
            owner: Some(owner.to_string()),
            ..Default::default()
        }
    }

    fn matches(&self, task: &TaskRecord) -> bool {
        self.owner.as_ref().map_or(true, |o| *o == task.owner)
            && self.status.map_or(true, |s| s == task.status)
            && self.priority.map_or(true, |p| p == task.priority)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    /// Unfinished tasks whose deadline is before today.
    pub overdue: usize,
}

// =============================================================================
// Backend seam
// =============================================================================

#[async_trait]
pub trait TaskTools: Send + Sync {
    async fn create_task(&self, task: NewTask) -> Result<TaskRecord, ToolError>;

    async fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, ToolError>;

    async fn get_statistics(&self, owner: &str) -> Result<TaskStatistics, ToolError>;

    async fn update_task(
        &self,
        owner: &str,
        id: &str,
        update: TaskUpdate,
    ) -> Result<TaskRecord, ToolError>;

    /// Remove a task and return it.
    async fn delete_task(&self, owner: &str, id: &str) -> Result<TaskRecord, ToolError>;
}

/// Process-local task backend with sequential ids.
pub struct InMemoryTaskBackend {
    inner: Mutex<BackendInner>,
    today: Option<NaiveDate>,
}

#[derive(Default)]
struct BackendInner {
    next_id: u64,
    tasks: BTreeMap<u64, TaskRecord>,
}

impl InMemoryTaskBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BackendInner {
                next_id: 1,
                tasks: BTreeMap::new(),
            }),
            today: None,
        }
    }

    /// Pin "today" for overdue counting.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BackendInner>, ToolError> {
        self.inner
            .lock()
            .map_err(|e| ToolError::Backend(format!("Lock poisoned: {}", e)))
    }
}

impl Default for InMemoryTaskBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_id(id: &str) -> Result<u64, ToolError> {
    id.trim()
        .trim_start_matches('#')
        .parse()
        .map_err(|_| ToolError::NotFound(id.to_string()))
}

#[async_trait]
impl TaskTools for InMemoryTaskBackend {
    async fn create_task(&self, task: NewTask) -> Result<TaskRecord, ToolError> {
        let title = task.title.trim();
        if title.is_empty() {
            return Err(ToolError::InvalidParameters("title is blank".to_string()));
        }
        let mut inner = self.lock()?;
        let id = inner.next_id;
        inner.next_id += 1;
        let now = Timestamp::now();
        let record = TaskRecord {
            id: id.to_string(),
            owner: task.owner,
            title: title.to_string(),
            description: task.description,
            priority: task.priority,
            deadline: task.deadline,
            status: TaskStatus::Todo,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(id, record.clone());
        Ok(record)
    }

    async fn get_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskRecord>, ToolError> {
        let inner = self.lock()?;
        let matching = inner.tasks.values().filter(|t| filter.matches(t)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn get_statistics(&self, owner: &str) -> Result<TaskStatistics, ToolError> {
        let today = self.today();
        let inner = self.lock()?;
        let mut stats = TaskStatistics::default();
        for task in inner.tasks.values().filter(|t| t.owner == owner) {
            stats.total += 1;
            *stats.by_status.entry(task.status.to_string()).or_default() += 1;
            *stats.by_priority.entry(task.priority.to_string()).or_default() += 1;
            if task.status != TaskStatus::Done && task.deadline.is_some_and(|d| d < today) {
                stats.overdue += 1;
            }
        }
        Ok(stats)
    }

    async fn update_task(
        &self,
        owner: &str,
        id: &str,
        update: TaskUpdate,
    ) -> Result<TaskRecord, ToolError> {
        if update.is_empty() {
            return Err(ToolError::InvalidParameters("nothing to update".to_string()));
        }
        let key = numeric_id(id)?;
        let mut inner = self.lock()?;
        let task = inner
            .tasks
            .get_mut(&key)
            .filter(|t| t.owner == owner)
            .ok_or_else(|| ToolError::NotFound(id.to_string()))?;

        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = Some(description);
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(deadline) = update.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(status) = update.status {
            task.status = status;
        }
        task.updated_at = Timestamp::now();
        Ok(task.clone())
    }

    async fn delete_task(&self, owner: &str, id: &str) -> Result<TaskRecord, ToolError> {
        let key = numeric_id(id)?;
        let mut inner = self.lock()?;
        match inner.tasks.get(&key) {
            Some(task) if task.owner == owner => {}
            _ => return Err(ToolError::NotFound(id.to_string())),
        }
        inner
            .tasks
            .remove(&key)
            .ok_or_else(|| ToolError::NotFound(id.to_string()))
    }
}

// =============================================================================
// Executor
// =============================================================================

/// What a backend call produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ToolOutput {
    Created(TaskRecord),
    Updated(TaskRecord),
    Deleted(TaskRecord),
    Listed(Vec<TaskRecord>),
    Statistics(TaskStatistics),
}

/// Record of one backend call, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub action: ActionKind,
    pub arguments: BTreeMap<String, String>,
    pub success: bool,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub invocation: ToolInvocation,
    pub output: Result<ToolOutput, ToolError>,
}

/// Runs a finished command against the task backend.
///
/// Read-only actions are retried once on a backend failure. Mutations are
/// never retried.
pub struct ActionExecutor {
    tools: Arc<dyn TaskTools>,
    retry_delay: Duration,
}

impl ActionExecutor {
    pub fn new(tools: Arc<dyn TaskTools>) -> Self {
        Self {
            tools,
            retry_delay: Duration::from_millis(50),
        }
    }

    pub fn tools(&self) -> &Arc<dyn TaskTools> {
        &self.tools
    }

    pub async fn execute(
        &self,
        owner: &str,
        action: ActionKind,
        slots: &BTreeMap<String, String>,
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let mut attempts = 1;
        let mut output = self.run_once(owner, action, slots).await;
        if action.is_read_only() {
            if let Err(err) = &output {
                if err.is_transient() {
                    warn!(%action, error = %err, "Read-only action failed, retrying once");
                    tokio::time::sleep(self.retry_delay).await;
                    attempts += 1;
                    output = self.run_once(owner, action, slots).await;
                }
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &output {
            Ok(_) => info!(%action, owner, elapsed_ms, "Action executed"),
            Err(err) => warn!(%action, owner, elapsed_ms, error = %err, "Action failed"),
        }
        ExecutionOutcome {
            invocation: ToolInvocation {
                action,
                arguments: slots.clone(),
                success: output.is_ok(),
                attempts,
                elapsed_ms,
                error: output.as_ref().err().map(ToString::to_string),
            },
            output,
        }
    }

    async fn run_once(
        &self,
        owner: &str,
        action: ActionKind,
        slots: &BTreeMap<String, String>,
    ) -> Result<ToolOutput, ToolError> {
        match action {
            ActionKind::CreateTask => {
                let task = new_task(owner, slots)?;
                self.tools.create_task(task).await.map(ToolOutput::Created)
            }
            ActionKind::UpdateTask => {
                let id = required(slots, slot::TASK_ID)?;
                let update =
                    TaskUpdate::from_field(required(slots, slot::FIELD)?, required(slots, slot::VALUE)?)?;
                self.tools
                    .update_task(owner, id, update)
                    .await
                    .map(ToolOutput::Updated)
            }
            ActionKind::DeleteTask => {
                let id = required(slots, slot::TASK_ID)?;
                self.tools.delete_task(owner, id).await.map(ToolOutput::Deleted)
            }
            ActionKind::GetTasks => {
                let filter = task_filter(owner, slots)?;
                self.tools.get_tasks(&filter).await.map(ToolOutput::Listed)
            }
            ActionKind::GetStatistics => self
                .tools
                .get_statistics(owner)
                .await
                .map(ToolOutput::Statistics),
            ActionKind::None => Err(ToolError::NotExecutable(action)),
        }
    }
}

fn required<'a>(slots: &'a BTreeMap<String, String>, name: &str) -> Result<&'a str, ToolError> {
    slots
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("{} is missing", name)))
}

fn parse_date(value: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidParameters(format!("Invalid deadline: {}", value)))
}

fn new_task(owner: &str, slots: &BTreeMap<String, String>) -> Result<NewTask, ToolError> {
    let priority = match slots.get(slot::PRIORITY) {
        Some(p) => p.parse().map_err(ToolError::InvalidParameters)?,
        None => Priority::Medium,
    };
    let deadline = slots.get(slot::DEADLINE).map(|d| parse_date(d)).transpose()?;
    Ok(NewTask {
        owner: owner.to_string(),
        title: required(slots, slot::TITLE)?.to_string(),
        description: slots.get(slot::DESCRIPTION).cloned(),
        priority,
        deadline,
    })
}

fn task_filter(owner: &str, slots: &BTreeMap<String, String>) -> Result<TaskFilter, ToolError> {
    let mut filter = TaskFilter::for_owner(owner);
    if let Some(status) = slots.get("status") {
        filter.status = Some(status.parse().map_err(ToolError::InvalidParameters)?);
    }
    if let Some(priority) = slots.get(slot::PRIORITY) {
        filter.priority = Some(priority.parse().map_err(ToolError::InvalidParameters)?);
    }
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn slots(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn new_task_for(owner: &str, title: &str) -> NewTask {
        NewTask {
            owner: owner.to_string(),
            title: title.to_string(),
            description: None,
            priority: Priority::Medium,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn test_backend_sequential_ids() {
        let backend = InMemoryTaskBackend::new();
        let a = backend.create_task(new_task_for("u1", "first")).await.unwrap();
        let b = backend.create_task(new_task_for("u1", "second")).await.unwrap();
        assert_eq!(a.id, "1");
        assert_eq!(b.id, "2");
        assert_eq!(a.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_backend_rejects_blank_title() {
        let backend = InMemoryTaskBackend::new();
        let err = backend.create_task(new_task_for("u1", "  ")).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_backend_filters_by_owner_and_status() {
        let backend = InMemoryTaskBackend::new();
        backend.create_task(new_task_for("u1", "mine")).await.unwrap();
        backend.create_task(new_task_for("u2", "theirs")).await.unwrap();
        backend
            .update_task("u1", "1", TaskUpdate::from_field("status", "done").unwrap())
            .await
            .unwrap();

        let mine = backend.get_tasks(&TaskFilter::for_owner("u1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "mine");

        let open = backend
            .get_tasks(&TaskFilter {
                status: Some(TaskStatus::Todo),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].owner, "u2");
    }

    #[tokio::test]
    async fn test_backend_update_and_delete_respect_owner() {
        let backend = InMemoryTaskBackend::new();
        backend.create_task(new_task_for("u1", "mine")).await.unwrap();
        let err = backend
            .update_task("u2", "1", TaskUpdate::from_field("title", "stolen").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert!(backend.delete_task("u2", "1").await.is_err());

        let deleted = backend.delete_task("u1", "#1").await.unwrap();
        assert_eq!(deleted.title, "mine");
        assert!(backend.get_tasks(&TaskFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_counts_overdue() {
        let backend = InMemoryTaskBackend::new().with_today(date(2026, 10, 15));
        let mut late = new_task_for("u1", "late");
        late.deadline = Some(date(2026, 10, 1));
        late.priority = Priority::High;
        backend.create_task(late.clone()).await.unwrap();
        let mut done_late = late.clone();
        done_late.title = "done late".to_string();
        backend.create_task(done_late).await.unwrap();
        backend
            .update_task("u1", "2", TaskUpdate::from_field("status", "done").unwrap())
            .await
            .unwrap();
        backend.create_task(new_task_for("u1", "open")).await.unwrap();

        let stats = backend.get_statistics("u1").await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.by_priority.get("HIGH"), Some(&2));
        assert_eq!(stats.by_status.get("DONE"), Some(&1));
        assert_eq!(stats.by_status.get("TODO"), Some(&2));
    }

    #[test]
    fn test_task_update_from_field() {
        assert_eq!(
            TaskUpdate::from_field("priority", "low").unwrap().priority,
            Some(Priority::Low)
        );
        assert_eq!(
            TaskUpdate::from_field("deadline", "2026-10-20").unwrap().deadline,
            Some(date(2026, 10, 20))
        );
        assert!(TaskUpdate::from_field("deadline", "soon").is_err());
        assert!(TaskUpdate::from_field("color", "red").is_err());
        assert!(TaskUpdate::from_field("title", " ").is_err());
    }

    #[tokio::test]
    async fn test_execute_create_defaults_priority() {
        let executor = ActionExecutor::new(Arc::new(InMemoryTaskBackend::new()));
        let outcome = executor
            .execute("u1", ActionKind::CreateTask, &slots(&[("title", "write report")]))
            .await;
        assert!(outcome.invocation.success);
        assert_eq!(outcome.invocation.attempts, 1);
        match outcome.output.unwrap() {
            ToolOutput::Created(task) => {
                assert_eq!(task.title, "write report");
                assert_eq!(task.priority, Priority::Medium);
                assert_eq!(task.deadline, None);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_update_and_delete() {
        let backend = Arc::new(InMemoryTaskBackend::new());
        let executor = ActionExecutor::new(backend.clone());
        executor
            .execute("u1", ActionKind::CreateTask, &slots(&[("title", "report")]))
            .await;

        let updated = executor
            .execute(
                "u1",
                ActionKind::UpdateTask,
                &slots(&[("task_id", "1"), ("field", "priority"), ("value", "HIGH")]),
            )
            .await;
        assert!(matches!(
            updated.output,
            Ok(ToolOutput::Updated(TaskRecord { priority: Priority::High, .. }))
        ));

        let deleted = executor
            .execute("u1", ActionKind::DeleteTask, &slots(&[("task_id", "1")]))
            .await;
        assert!(matches!(deleted.output, Ok(ToolOutput::Deleted(_))));
    }

    #[tokio::test]
    async fn test_execute_missing_slot_is_invalid() {
        let executor = ActionExecutor::new(Arc::new(InMemoryTaskBackend::new()));
        let outcome = executor
            .execute("u1", ActionKind::DeleteTask, &BTreeMap::new())
            .await;
        assert!(!outcome.invocation.success);
        assert_eq!(outcome.invocation.error.as_deref(), Some("Invalid task parameters: task_id is missing"));
    }

    #[tokio::test]
    async fn test_execute_none_is_not_executable() {
        let executor = ActionExecutor::new(Arc::new(InMemoryTaskBackend::new()));
        let outcome = executor.execute("u1", ActionKind::None, &BTreeMap::new()).await;
        assert!(matches!(
            outcome.output,
            Err(ToolError::NotExecutable(ActionKind::None))
        ));
    }

    /// Fails every call with a backend error and counts the attempts.
    struct FlakyBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskTools for FlakyBackend {
        async fn create_task(&self, _task: NewTask) -> Result<TaskRecord, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Backend("down".to_string()))
        }

        async fn get_tasks(&self, _filter: &TaskFilter) -> Result<Vec<TaskRecord>, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Backend("down".to_string()))
        }

        async fn get_statistics(&self, _owner: &str) -> Result<TaskStatistics, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Backend("down".to_string()))
        }

        async fn update_task(
            &self,
            _owner: &str,
            _id: &str,
            _update: TaskUpdate,
        ) -> Result<TaskRecord, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Backend("down".to_string()))
        }

        async fn delete_task(&self, _owner: &str, _id: &str) -> Result<TaskRecord, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolError::Backend("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_read_only_retried_once_mutation_not() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
        });
        let executor = ActionExecutor::new(backend.clone());

        let listed = executor.execute("u1", ActionKind::GetTasks, &BTreeMap::new()).await;
        assert_eq!(listed.invocation.attempts, 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        let created = executor
            .execute("u1", ActionKind::CreateTask, &slots(&[("title", "x y")]))
            .await;
        assert_eq!(created.invocation.attempts, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }
}
