//! User-facing advisories attached to a search

use serde::{Deserialize, Serialize};

/// An alternative query the user may want to run instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedQuery {
    pub description: String,
    pub query: String,
}

/// A single advisory message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    pub description: String,
    /// Higher is more severe
    pub priority: i32,
    #[serde(default)]
    pub proposed_queries: Vec<ProposedQuery>,
}

impl Alert {
    pub fn new(title: impl Into<String>, description: impl Into<String>, priority: i32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            priority,
            proposed_queries: Vec::new(),
        }
    }

    pub fn with_proposed_query(
        mut self,
        description: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        self.proposed_queries.push(ProposedQuery {
            description: description.into(),
            query: query.into(),
        });
        self
    }
}

/// Keeps the most severe alert seen. Ties keep the earlier alert.
#[derive(Debug, Default)]
pub struct MaxAlerter {
    alert: Option<Alert>,
}

impl MaxAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, alert: Option<Alert>) {
        let Some(alert) = alert else { return };
        match &self.alert {
            Some(current) if current.priority >= alert.priority => {}
            _ => self.alert = Some(alert),
        }
    }

    pub fn alert(&self) -> Option<&Alert> {
        self.alert.as_ref()
    }

    pub fn into_alert(self) -> Option<Alert> {
        self.alert
    }
}
