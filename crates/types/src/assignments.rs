//! Assignment and tracked-event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::targeting::UserContext;

/// Kind of event recorded against an assignment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentEventKind {
    Exposure,
    Conversion,
}

/// An event appended to an assignment's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub kind: AssignmentEventKind,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

impl AssignmentEvent {
    pub fn new(kind: AssignmentEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A recorded conversion against a specific metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub metric_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

/// A user's assignment to a variant within one experiment
///
/// At most one assignment exists per (user, experiment) pair; once
/// created the variant is never reassigned for the experiment's life.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: String,
    pub experiment_id: Uuid,
    pub variant_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    /// Set on the first exposure event only
    pub exposed_at: Option<DateTime<Utc>>,
    /// Set on the first conversion event only
    pub conversion_time: Option<DateTime<Utc>>,
    /// User context captured at assignment time
    pub context: UserContext,
    /// Append-only event log
    pub events: Vec<AssignmentEvent>,
    /// Append-only conversion records
    pub conversions: Vec<ConversionRecord>,
}

impl Assignment {
    pub fn new(
        user_id: impl Into<String>,
        experiment_id: Uuid,
        variant_id: Uuid,
        context: UserContext,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            experiment_id,
            variant_id,
            assigned_at: Utc::now(),
            exposed_at: None,
            conversion_time: None,
            context,
            events: Vec::new(),
            conversions: Vec::new(),
        }
    }

    /// Whether any conversion has been recorded for the given metric
    pub fn has_converted(&self, metric_id: &str) -> bool {
        self.conversions.iter().any(|c| c.metric_id == metric_id)
    }
}
