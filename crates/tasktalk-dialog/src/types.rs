//! Domain types for the dialog engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tasktalk_core::FlowType;

/// Slot names shared by the classifier, the slot engine and the executor.
pub mod slot {
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const PRIORITY: &str = "priority";
    pub const DEADLINE: &str = "deadline";
    pub const TASK_ID: &str = "task_id";
    pub const FIELD: &str = "field";
    pub const VALUE: &str = "value";
    /// Catch-all used when a message in an active flow fits no known slot.
    pub const ADDITIONAL_INFO: &str = "additional_info";

    /// Slots whose answer is arbitrary text rather than a keyword or date.
    pub fn is_free_text(name: &str) -> bool {
        matches!(name, TITLE | DESCRIPTION | VALUE | ADDITIONAL_INFO)
    }
}

// =============================================================================
// Coarse intent
// =============================================================================

/// Coarse purpose of a message, consumed by the orchestrator's dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentType {
    Command,
    Query,
    Chitchat,
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentType::Command => write!(f, "COMMAND"),
            IntentType::Query => write!(f, "QUERY"),
            IntentType::Chitchat => write!(f, "CHITCHAT"),
        }
    }
}

/// Closed set of backend actions. Routing matches on this exhaustively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    CreateTask,
    UpdateTask,
    DeleteTask,
    GetTasks,
    GetStatistics,
    None,
}

impl ActionKind {
    /// Actions that never mutate the backend.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ActionKind::GetTasks | ActionKind::GetStatistics | ActionKind::None
        )
    }

    /// Slots that must be present before the action can run.
    pub fn required_slots(&self) -> &'static [&'static str] {
        match self {
            ActionKind::CreateTask => &[slot::TITLE],
            ActionKind::UpdateTask => &[slot::TASK_ID, slot::FIELD, slot::VALUE],
            ActionKind::DeleteTask => &[slot::TASK_ID],
            ActionKind::GetTasks | ActionKind::GetStatistics | ActionKind::None => &[],
        }
    }

    /// Slots the engine asks for, in asking order. Includes the required ones.
    pub fn prompted_slots(&self) -> &'static [&'static str] {
        match self {
            ActionKind::CreateTask => &[slot::TITLE, slot::PRIORITY, slot::DEADLINE],
            ActionKind::UpdateTask => &[slot::TASK_ID, slot::FIELD, slot::VALUE],
            ActionKind::DeleteTask => &[slot::TASK_ID],
            ActionKind::GetTasks | ActionKind::GetStatistics | ActionKind::None => &[],
        }
    }

    /// Whether `name` is a slot this action accepts.
    pub fn accepts_slot(&self, name: &str) -> bool {
        self.prompted_slots().contains(&name)
            || (*self == ActionKind::CreateTask && name == slot::DESCRIPTION)
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.prompted_slots().contains(&name) && !self.required_slots().contains(&name)
    }

    pub fn flow_type(&self) -> FlowType {
        match self {
            ActionKind::CreateTask => FlowType::CreateTask,
            ActionKind::UpdateTask => FlowType::UpdateTask,
            ActionKind::DeleteTask => FlowType::DeleteTask,
            ActionKind::GetTasks | ActionKind::GetStatistics => FlowType::ListTasks,
            ActionKind::None => FlowType::GeneralChat,
        }
    }

    pub fn from_flow_type(flow: FlowType) -> Self {
        match flow {
            FlowType::CreateTask => ActionKind::CreateTask,
            FlowType::UpdateTask => ActionKind::UpdateTask,
            FlowType::DeleteTask => ActionKind::DeleteTask,
            FlowType::ListTasks => ActionKind::GetTasks,
            FlowType::GeneralChat => ActionKind::None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::CreateTask => write!(f, "CREATE_TASK"),
            ActionKind::UpdateTask => write!(f, "UPDATE_TASK"),
            ActionKind::DeleteTask => write!(f, "DELETE_TASK"),
            ActionKind::GetTasks => write!(f, "GET_TASKS"),
            ActionKind::GetStatistics => write!(f, "GET_STATISTICS"),
            ActionKind::None => write!(f, "NONE"),
        }
    }
}

/// One classification, in the shape the orchestrator dispatches on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent_type: IntentType,
    pub action: ActionKind,
    pub confidence: f32,
    pub slots: BTreeMap<String, String>,
    pub needs_more_info: bool,
    pub follow_up_question: Option<String>,
}

impl IntentResult {
    pub fn chitchat(confidence: f32) -> Self {
        Self {
            intent_type: IntentType::Chitchat,
            action: ActionKind::None,
            confidence,
            slots: BTreeMap::new(),
            needs_more_info: false,
            follow_up_question: None,
        }
    }

    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots.get(name).map(String::as_str)
    }
}

// =============================================================================
// Fine-grained context analysis
// =============================================================================

/// Multi-turn flow a message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationFlow {
    TaskCreation,
    TaskUpdate,
    TaskDeletion,
    TaskQuery,
    Idle,
}

impl ConversationFlow {
    /// Flows that collect parameters and must survive interruptions.
    pub fn is_task_flow(&self) -> bool {
        matches!(
            self,
            ConversationFlow::TaskCreation
                | ConversationFlow::TaskUpdate
                | ConversationFlow::TaskDeletion
        )
    }

    pub fn from_flow_type(flow: FlowType) -> Self {
        match flow {
            FlowType::CreateTask => ConversationFlow::TaskCreation,
            FlowType::UpdateTask => ConversationFlow::TaskUpdate,
            FlowType::DeleteTask => ConversationFlow::TaskDeletion,
            FlowType::ListTasks => ConversationFlow::TaskQuery,
            FlowType::GeneralChat => ConversationFlow::Idle,
        }
    }
}

impl fmt::Display for ConversationFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationFlow::TaskCreation => write!(f, "TASK_CREATION"),
            ConversationFlow::TaskUpdate => write!(f, "TASK_UPDATE"),
            ConversationFlow::TaskDeletion => write!(f, "TASK_DELETION"),
            ConversationFlow::TaskQuery => write!(f, "TASK_QUERY"),
            ConversationFlow::Idle => write!(f, "IDLE"),
        }
    }
}

impl FromStr for ConversationFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TASK_CREATION" => Ok(ConversationFlow::TaskCreation),
            "TASK_UPDATE" => Ok(ConversationFlow::TaskUpdate),
            "TASK_DELETION" => Ok(ConversationFlow::TaskDeletion),
            "TASK_QUERY" => Ok(ConversationFlow::TaskQuery),
            "IDLE" => Ok(ConversationFlow::Idle),
            other => Err(format!("Unknown conversation flow: {}", other)),
        }
    }
}

/// Role of a message within the current flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextIntent {
    /// Opens a task command (create, update or delete, per the flow).
    TaskCreation,
    FieldInput,
    Offtopic,
    SmallTalk,
    Clarification,
    Confirmation,
}

impl fmt::Display for ContextIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextIntent::TaskCreation => write!(f, "TASK_CREATION"),
            ContextIntent::FieldInput => write!(f, "FIELD_INPUT"),
            ContextIntent::Offtopic => write!(f, "OFFTOPIC"),
            ContextIntent::SmallTalk => write!(f, "SMALL_TALK"),
            ContextIntent::Clarification => write!(f, "CLARIFICATION"),
            ContextIntent::Confirmation => write!(f, "CONFIRMATION"),
        }
    }
}

impl FromStr for ContextIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TASK_CREATION" => Ok(ContextIntent::TaskCreation),
            "FIELD_INPUT" => Ok(ContextIntent::FieldInput),
            "OFFTOPIC" | "OFF_TOPIC" => Ok(ContextIntent::Offtopic),
            "SMALL_TALK" => Ok(ContextIntent::SmallTalk),
            "CLARIFICATION" => Ok(ContextIntent::Clarification),
            "CONFIRMATION" => Ok(ContextIntent::Confirmation),
            other => Err(format!("Unknown context intent: {}", other)),
        }
    }
}

/// Which classification strategy produced an analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassifierTier {
    Model,
    Fallback,
}

impl fmt::Display for ClassifierTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierTier::Model => write!(f, "model"),
            ClassifierTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// Fine-grained classification of a message against the active flow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub current_flow: ConversationFlow,
    pub intent_type: ContextIntent,
    pub field_mapping: Option<String>,
    pub extracted_value: Option<String>,
    pub confidence: f32,
    pub should_continue_flow: bool,
    pub next_expected_input: Option<String>,
    pub relevant_history: Vec<String>,
    /// Extra signals: `trigger`, `query`, and `slot.<name>` for secondary
    /// slots found in the same message.
    pub metadata: BTreeMap<String, String>,
    pub tier: ClassifierTier,
}

impl ContextAnalysis {
    pub fn new(
        current_flow: ConversationFlow,
        intent_type: ContextIntent,
        confidence: f32,
        tier: ClassifierTier,
    ) -> Self {
        Self {
            current_flow,
            intent_type,
            field_mapping: None,
            extracted_value: None,
            confidence,
            should_continue_flow: current_flow.is_task_flow(),
            next_expected_input: None,
            relevant_history: Vec::new(),
            metadata: BTreeMap::new(),
            tier,
        }
    }

    pub fn with_field(mut self, field: &str, value: impl Into<String>) -> Self {
        self.field_mapping = Some(field.to_string());
        self.extracted_value = Some(value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn expecting(mut self, next: Option<String>) -> Self {
        self.next_expected_input = next;
        self
    }

    /// Command detected without an explicit trigger phrase.
    pub fn is_implicit(&self) -> bool {
        self.metadata.get("trigger").map(String::as_str) == Some("implicit")
    }

    pub fn query_target(&self) -> Option<&str> {
        self.metadata.get("query").map(String::as_str)
    }
}

/// Outcome of one slot-filling step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SlotFillingResult {
    pub is_complete: bool,
    pub next_question: Option<String>,
    pub current_slots: BTreeMap<String, String>,
    pub action: ActionKind,
}

// =============================================================================
// Task vocabulary
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Medium => write!(f, "MEDIUM"),
            Priority::Low => write!(f, "LOW"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Priority::High),
            "MEDIUM" => Ok(Priority::Medium),
            "LOW" => Ok(Priority::Low),
            other => Err(format!("Unknown priority: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "TODO"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Done => write!(f, "DONE"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_lowercase().replace(['_', '-'], " ");
        match norm.as_str() {
            "todo" | "to do" | "open" | "pending" | "chưa làm" => Ok(TaskStatus::Todo),
            "in progress" | "doing" | "started" | "đang làm" => Ok(TaskStatus::InProgress),
            "done" | "completed" | "complete" | "finished" | "xong" | "hoàn thành" => {
                Ok(TaskStatus::Done)
            }
            other => Err(format!("Unknown task status: {}", other)),
        }
    }
}
