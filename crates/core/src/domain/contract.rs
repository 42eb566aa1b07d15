//! Shapes written to durable client storage. Each envelope carries a schema
//! version; data written under another version is discarded, never migrated.

use crate::domain::dashboard::{DashboardState, WidgetInstance, DASHBOARD_SCHEMA_VERSION};
use crate::domain::rule::Rule;
use crate::domain::widget::Preset;
use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const RULES_SCHEMA_VERSION: u32 = 1;

const DASHBOARD_KEY_PREFIX: &str = "tamio_dashboard_";
const RULES_KEY_PREFIX: &str = "tamio_rules_";

pub fn dashboard_key(user_id: &str) -> String {
    format!("{DASHBOARD_KEY_PREFIX}{user_id}")
}

pub fn rules_key(user_id: &str) -> String {
    format!("{RULES_KEY_PREFIX}{user_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDashboard {
    pub schema_version: u32,
    pub widgets: Vec<WidgetInstance>,
    pub active_preset: Preset,
    pub last_modified: DateTime<Utc>,
}

impl From<&DashboardState> for StoredDashboard {
    fn from(state: &DashboardState) -> Self {
        Self {
            schema_version: state.schema_version,
            widgets: state.widgets.clone(),
            active_preset: state.active_preset,
            last_modified: state.last_modified,
        }
    }
}

impl StoredDashboard {
    pub fn validate_and_into_state(self) -> anyhow::Result<DashboardState> {
        ensure!(
            self.schema_version == DASHBOARD_SCHEMA_VERSION,
            "dashboard schema version mismatch: expected {DASHBOARD_SCHEMA_VERSION}, got {}",
            self.schema_version
        );

        let mut seen = BTreeSet::new();
        for widget in &self.widgets {
            ensure!(
                !widget.instance_id.trim().is_empty(),
                "widget instance id must be non-empty"
            );
            ensure!(
                seen.insert(widget.instance_id.as_str()),
                "duplicate widget instance id: {}",
                widget.instance_id
            );
        }

        Ok(DashboardState {
            schema_version: self.schema_version,
            dirty: self.active_preset == Preset::Custom,
            active_preset: self.active_preset,
            widgets: self.widgets,
            last_modified: self.last_modified,
        })
    }
}

pub fn parse_dashboard(text: &str) -> anyhow::Result<DashboardState> {
    serde_json::from_str::<StoredDashboard>(text)
        .context("stored dashboard is not valid JSON for the dashboard schema")?
        .validate_and_into_state()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRules {
    pub version: u32,
    pub rules: Vec<Rule>,
    pub last_updated: DateTime<Utc>,
}

/// Header-only view so a version bump is detected even when the rule shape
/// changed along with it.
#[derive(Debug, Deserialize)]
struct VersionHeader {
    version: u32,
}

impl StoredRules {
    pub fn new(rules: Vec<Rule>, last_updated: DateTime<Utc>) -> Self {
        Self {
            version: RULES_SCHEMA_VERSION,
            rules,
            last_updated,
        }
    }
}

pub fn parse_rules(text: &str) -> anyhow::Result<Vec<Rule>> {
    let header = serde_json::from_str::<VersionHeader>(text)
        .context("stored rules are missing a version")?;
    ensure!(
        header.version == RULES_SCHEMA_VERSION,
        "rules schema version mismatch: expected {RULES_SCHEMA_VERSION}, got {}",
        header.version
    );

    let stored = serde_json::from_str::<StoredRules>(text)
        .context("stored rules are not valid JSON for the rules schema")?;
    let mut seen = BTreeSet::new();
    for rule in &stored.rules {
        ensure!(seen.insert(rule.id.as_str()), "duplicate rule id: {}", rule.id);
    }
    Ok(stored.rules)
}
