//! Plan domain types
//!
//! A plan is one questionnaire submission plus everything the generation
//! pipeline derives from it. Status moves forward only: each stage advances
//! it one step, and any stage error jumps it to `failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Plan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created, not yet picked up by a pipeline run
    #[default]
    Pending,
    /// Analyst stage running
    Analysing,
    /// Strategist stage running
    Generating,
    /// Reviewer stage running
    Reviewing,
    /// Finalizer stage running
    Finalising,
    /// Final document ready
    Completed,
    /// A stage failed; `error_message` carries the reason
    Failed,
}

impl PlanStatus {
    /// Stable string form used in the database and over the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analysing => "analysing",
            Self::Generating => "generating",
            Self::Reviewing => "reviewing",
            Self::Finalising => "finalising",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse the database string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "analysing" => Some(Self::Analysing),
            "generating" => Some(Self::Generating),
            "reviewing" => Some(Self::Reviewing),
            "finalising" => Some(Self::Finalising),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Position in the lifecycle; progress consumers drop events whose rank
    /// does not advance, so stale reads never move a stream backwards
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Analysing => 1,
            Self::Generating => 2,
            Self::Reviewing => 3,
            Self::Finalising => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }

    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if a pipeline run still owns the plan
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown plan status: {s}"))
    }
}

/// Where to reach the plan owner once the document is ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Contact {
    pub fn new(email: impl Into<String>, name: Option<String>) -> Self {
        Self { email: email.into(), name }
    }
}

/// A questionnaire submission and the artifacts derived from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier (UUIDv7, time-ordered)
    pub id: String,

    /// Current lifecycle status
    pub status: PlanStatus,

    /// Questionnaire answers as submitted; never mutated after creation
    pub questionnaire: Value,

    /// Owner contact, when one was supplied
    #[serde(default)]
    pub contact: Option<Contact>,

    /// Analyst stage output (JSON market brief)
    #[serde(default)]
    pub analyst_brief: Option<Value>,

    /// Reviewer stage output (JSON critique)
    #[serde(default)]
    pub review: Option<Value>,

    /// Finished marketing plan (markdown)
    #[serde(default)]
    pub final_document: Option<String>,

    /// Last error message (set when status is `failed`)
    #[serde(default)]
    pub error_message: Option<String>,

    /// Total cost in EUR, summed over the usage log at completion
    #[serde(default)]
    pub total_cost: Option<f64>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the plan reached a terminal status
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Plan {
    /// Create a pending plan with a generated ID
    pub fn new(questionnaire: Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            status: PlanStatus::Pending,
            questionnaire,
            contact: None,
            analyst_brief: None,
            review: None,
            final_document: None,
            error_message: None,
            total_cost: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Create with a specific ID (tests and recovery)
    pub fn with_id(id: impl Into<String>, questionnaire: Value) -> Self {
        let mut plan = Self::new(questionnaire);
        plan.id = id.into();
        plan
    }

    /// Builder method to attach the owner contact
    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = Some(contact);
        self
    }

    /// Builder method to set the status
    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update applied to a stored plan
///
/// Unset fields leave the stored value untouched. Every ordinary write in
/// the subsystem goes through one of these; the two guarded writes on
/// [`crate::Store`] are the only conditional updates.
#[derive(Debug, Clone, Default)]
pub struct PlanPatch {
    pub status: Option<PlanStatus>,
    pub analyst_brief: Option<Value>,
    pub review: Option<Value>,
    pub final_document: Option<String>,
    pub error_message: Option<String>,
    pub total_cost: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PlanPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_analyst_brief(mut self, brief: Value) -> Self {
        self.analyst_brief = Some(brief);
        self
    }

    pub fn with_review(mut self, review: Value) -> Self {
        self.review = Some(review);
        self
    }

    pub fn with_final_document(mut self, document: impl Into<String>) -> Self {
        self.final_document = Some(document.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_total_cost(mut self, cost: f64) -> Self {
        self.total_cost = Some(cost);
        self
    }

    pub fn with_completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// True when the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.analyst_brief.is_none()
            && self.review.is_none()
            && self.final_document.is_none()
            && self.error_message.is_none()
            && self.total_cost.is_none()
            && self.completed_at.is_none()
    }
}
