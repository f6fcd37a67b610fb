use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{StoreError, StoreResult};

/// Shown in place of notes the user left blank.
pub const NOTES_PLACEHOLDER: &str = "—";

pub const DEFAULT_RESULT: &str = "Pending";

/// Pipeline position of an application. The named stages drive the summary
/// counts; anything else the user types is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Stage {
    Applied,
    Interview,
    Offer,
    Rejected,
    Other(String),
}

impl Stage {
    pub const NAMED: [Stage; 4] = [Stage::Applied, Stage::Interview, Stage::Offer, Stage::Rejected];

    pub fn as_str(&self) -> &str {
        match self {
            Stage::Applied => "Applied",
            Stage::Interview => "Interview",
            Stage::Offer => "Offer",
            Stage::Rejected => "Rejected",
            Stage::Other(s) => s,
        }
    }
}

impl From<String> for Stage {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Applied" => Stage::Applied,
            "Interview" => Stage::Interview,
            "Offer" => Stage::Offer,
            "Rejected" => Stage::Rejected,
            _ => Stage::Other(s),
        }
    }
}

impl From<&str> for Stage {
    fn from(s: &str) -> Self {
        Stage::from(s.to_string())
    }
}

impl From<Stage> for String {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Other(s) => s,
            named => named.as_str().to_string(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage filter for queries. `All` is the "show everything" chip.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageFilter {
    #[default]
    All,
    Only(Stage),
}

impl StageFilter {
    /// Chips offered by the table view, in display order.
    pub fn chips() -> Vec<StageFilter> {
        std::iter::once(StageFilter::All)
            .chain(Stage::NAMED.into_iter().map(StageFilter::Only))
            .collect()
    }

    pub fn matches(&self, stage: &Stage) -> bool {
        match self {
            StageFilter::All => true,
            StageFilter::Only(s) => s == stage,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            StageFilter::All => "All",
            StageFilter::Only(s) => s.as_str(),
        }
    }
}

impl From<&str> for StageFilter {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("all") {
            StageFilter::All
        } else {
            StageFilter::Only(Stage::from(s))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: i64,
    pub company: String,
    pub role: String,
    pub stage: Stage,
    pub result: String,
    pub date: NaiveDate,
    pub notes: String,
}

impl ApplicationRecord {
    pub fn has_notes(&self) -> bool {
        self.notes != NOTES_PLACEHOLDER
    }

    /// Case-insensitive substring match on company or role. `needle` must
    /// already be lowercased.
    pub fn matches_search(&self, needle: &str) -> bool {
        needle.is_empty()
            || self.company.to_lowercase().contains(needle)
            || self.role.to_lowercase().contains(needle)
    }
}

/// A submitted form, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub company: String,
    pub role: String,
    pub stage: Stage,
    pub result: String,
    pub date: NaiveDate,
    pub notes: String,
}

impl NewApplication {
    pub fn new(company: &str, role: &str, stage: Stage, date: NaiveDate) -> Self {
        Self {
            company: company.to_string(),
            role: role.to_string(),
            stage,
            result: DEFAULT_RESULT.to_string(),
            date,
            notes: String::new(),
        }
    }

    /// Company, role and stage are required fields of the form.
    pub fn validate(&self) -> StoreResult<()> {
        if self.company.trim().is_empty() {
            return Err(StoreError::InvalidRecord("company is required".to_string()));
        }
        if self.role.trim().is_empty() {
            return Err(StoreError::InvalidRecord("role is required".to_string()));
        }
        if self.stage.as_str().trim().is_empty() {
            return Err(StoreError::InvalidRecord("stage is required".to_string()));
        }
        Ok(())
    }

    pub fn with_result(mut self, result: &str) -> Self {
        self.result = result.to_string();
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }
}

impl From<ApplicationRecord> for NewApplication {
    /// Pre-populates an edit draft. The notes placeholder becomes blank again.
    fn from(record: ApplicationRecord) -> Self {
        let notes = if record.has_notes() { record.notes } else { String::new() };
        Self {
            company: record.company,
            role: record.role,
            stage: record.stage,
            result: record.result,
            date: record.date,
            notes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    pub total: usize,
    pub interviews: usize,
    pub offers: usize,
    pub rejected: usize,
    pub success_rate: u32,
}
