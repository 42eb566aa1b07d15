use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_APPLIED_SCENARIOS: usize = 5;

/// Overlay colors, assigned by position in the applied list.
pub const SCENARIO_PALETTE: [&str; 5] = ["#8B5CF6", "#F59E0B", "#10B981", "#EF4444", "#3B82F6"];

pub fn palette_color(index: usize) -> &'static str {
    SCENARIO_PALETTE[index % SCENARIO_PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub params: ScenarioParams,
    #[serde(default = "ScenarioStatus::draft")]
    pub status: ScenarioStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Draft,
    Saved,
}

impl ScenarioStatus {
    fn draft() -> Self {
        ScenarioStatus::Draft
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scenario_type", rename_all = "snake_case")]
pub enum ScenarioParams {
    PaymentDelayIn {
        client: String,
        delay_weeks: u32,
    },
    PaymentDelayOut {
        vendor: String,
        delay_weeks: u32,
    },
    ClientLoss {
        client: String,
        monthly_revenue: f64,
        effective_date: NaiveDate,
    },
    ClientGain {
        client: String,
        monthly_revenue: f64,
        start_date: NaiveDate,
    },
    Hiring {
        role: String,
        monthly_cost: f64,
        start_date: NaiveDate,
    },
    ExpenseChange {
        category: String,
        monthly_change: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScenario {
    pub name: String,
    pub params: ScenarioParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSuggestion {
    pub name: String,
    pub reason: String,
    pub params: ScenarioParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioComparison {
    pub scenario_id: String,
    pub weeks: Vec<ComparisonWeek>,
    #[serde(default)]
    pub runway_change_weeks: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonWeek {
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub base_balance: f64,
    pub scenario_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioTableRow {
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub base: f64,
    pub scenario: f64,
    pub delta: f64,
}

impl ScenarioComparison {
    pub fn table_rows(&self) -> Vec<ScenarioTableRow> {
        self.weeks
            .iter()
            .map(|w| ScenarioTableRow {
                week_number: w.week_number,
                week_start: w.week_start,
                base: w.base_balance,
                scenario: w.scenario_balance,
                delta: w.scenario_balance - w.base_balance,
            })
            .collect()
    }

    pub fn lowest_scenario_balance(&self) -> Option<f64> {
        self.weeks
            .iter()
            .map(|w| w.scenario_balance)
            .min_by(|a, b| a.total_cmp(b))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedScenario {
    pub id: String,
    pub name: String,
    pub color: &'static str,
    pub comparison: ScenarioComparison,
    pub table_data: Vec<ScenarioTableRow>,
}

/// Applied scenarios in display order. An entry's cached comparison and table
/// live inside it, so removing or clearing entries drops the cache with them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioOverlay {
    applied: Vec<AppliedScenario>,
}

impl ScenarioOverlay {
    pub fn applied(&self) -> &[AppliedScenario] {
        &self.applied
    }

    pub fn contains(&self, id: &str) -> bool {
        self.applied.iter().any(|s| s.id == id)
    }

    pub fn is_full(&self) -> bool {
        self.applied.len() >= MAX_APPLIED_SCENARIOS
    }

    /// Ignored when the id is already applied or the cap is reached.
    pub fn apply(&mut self, id: &str, name: &str, comparison: ScenarioComparison) -> bool {
        if self.contains(id) || self.is_full() {
            return false;
        }
        let table_data = comparison.table_rows();
        self.applied.push(AppliedScenario {
            id: id.to_string(),
            name: name.to_string(),
            color: palette_color(self.applied.len()),
            comparison,
            table_data,
        });
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.applied.len();
        self.applied.retain(|s| s.id != id);
        if self.applied.len() == before {
            return false;
        }
        // Colors follow current position, not insertion history.
        for (idx, scenario) in self.applied.iter_mut().enumerate() {
            scenario.color = palette_color(idx);
        }
        true
    }

    pub fn clear(&mut self) -> bool {
        if self.applied.is_empty() {
            return false;
        }
        self.applied.clear();
        true
    }
}
