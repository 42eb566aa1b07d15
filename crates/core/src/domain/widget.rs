use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub type WidgetSettings = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetCategory {
    Cash,
    Health,
    Obligations,
    Alerts,
    Forecast,
}

impl WidgetCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Some(Self::Cash),
            "health" => Some(Self::Health),
            "obligations" => Some(Self::Obligations),
            "alerts" => Some(Self::Alerts),
            "forecast" => Some(Self::Forecast),
            _ => None,
        }
    }
}

/// Dashboard layout a user can start from. `Custom` means the widget list has
/// diverged from every canned layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Leader,
    FinanceManager,
    Custom,
}

impl Preset {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "leader" => Some(Self::Leader),
            "finance_manager" => Some(Self::FinanceManager),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WidgetDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: WidgetCategory,
    pub default_settings: WidgetSettings,
    /// Name of the view component that draws this widget. Entries without one
    /// are declared (presets may point at them) but not placeable yet.
    pub renderer: Option<&'static str>,
}

const LEADER_WIDGETS: &[&str] = &["cash_runway", "health_status", "next_big_obligation"];

const FINANCE_MANAGER_WIDGETS: &[&str] = &[
    "cash_position",
    "cash_runway",
    "obligations_tracker",
    "alerts_feed",
    "net_cash_flow",
    "bank_accounts_overview",
];

pub fn preset_widget_ids(preset: Preset) -> Option<&'static [&'static str]> {
    match preset {
        Preset::Leader => Some(LEADER_WIDGETS),
        Preset::FinanceManager => Some(FINANCE_MANAGER_WIDGETS),
        Preset::Custom => None,
    }
}

pub fn registry() -> &'static [WidgetDefinition] {
    static REGISTRY: OnceLock<Vec<WidgetDefinition>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

pub fn lookup(widget_id: &str) -> Option<&'static WidgetDefinition> {
    registry().iter().find(|def| def.id == widget_id)
}

/// Definition a dashboard card should draw, or `None` when the card renders
/// nothing (unknown id, or a declared widget without a renderer).
pub fn resolve_card(widget_id: &str) -> Option<&'static WidgetDefinition> {
    lookup(widget_id).filter(|def| def.renderer.is_some())
}

pub fn list_by_category(category: WidgetCategory) -> Vec<&'static WidgetDefinition> {
    registry()
        .iter()
        .filter(|def| def.category == category && def.renderer.is_some())
        .collect()
}

pub fn default_settings(widget_id: &str) -> WidgetSettings {
    lookup(widget_id)
        .map(|def| def.default_settings.clone())
        .unwrap_or_default()
}

fn settings(pairs: &[(&str, Value)]) -> WidgetSettings {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn build_registry() -> Vec<WidgetDefinition> {
    vec![
        WidgetDefinition {
            id: "cash_position",
            name: "Cash Position",
            description: "Current cash across all connected accounts",
            category: WidgetCategory::Cash,
            default_settings: settings(&[("show_change", json!(true))]),
            renderer: Some("CashPositionWidget"),
        },
        WidgetDefinition {
            id: "cash_runway",
            name: "Cash Runway",
            description: "Weeks of runway at the current burn rate",
            category: WidgetCategory::Cash,
            default_settings: settings(&[("horizon_weeks", json!(13))]),
            renderer: Some("CashRunwayWidget"),
        },
        WidgetDefinition {
            id: "net_cash_flow",
            name: "Net Cash Flow",
            description: "Cash in minus cash out per period",
            category: WidgetCategory::Cash,
            default_settings: settings(&[("granularity", json!("weekly"))]),
            renderer: Some("NetCashFlowWidget"),
        },
        WidgetDefinition {
            id: "bank_accounts_overview",
            name: "Bank Accounts",
            description: "Balances per connected bank account",
            category: WidgetCategory::Cash,
            default_settings: settings(&[("show_inactive", json!(false))]),
            renderer: Some("BankAccountsOverviewWidget"),
        },
        WidgetDefinition {
            id: "health_status",
            name: "Health Status",
            description: "Overall treasury health at a glance",
            category: WidgetCategory::Health,
            default_settings: WidgetSettings::new(),
            renderer: Some("HealthStatusWidget"),
        },
        WidgetDefinition {
            id: "next_big_obligation",
            name: "Next Big Obligation",
            description: "The largest upcoming payment and whether cash covers it",
            category: WidgetCategory::Obligations,
            default_settings: settings(&[("min_amount", json!(10_000))]),
            renderer: Some("NextBigObligationWidget"),
        },
        WidgetDefinition {
            id: "obligations_tracker",
            name: "Obligations Tracker",
            description: "Upcoming payroll, tax and supplier payments",
            category: WidgetCategory::Obligations,
            default_settings: settings(&[("lookahead_days", json!(30))]),
            renderer: Some("ObligationsTrackerWidget"),
        },
        WidgetDefinition {
            id: "upcoming_payroll",
            name: "Upcoming Payroll",
            description: "Next payroll run and coverage",
            category: WidgetCategory::Obligations,
            default_settings: WidgetSettings::new(),
            renderer: None,
        },
        WidgetDefinition {
            id: "alerts_feed",
            name: "Alerts Feed",
            description: "Recent rule triggers and risk alerts",
            category: WidgetCategory::Alerts,
            default_settings: settings(&[("max_items", json!(5))]),
            renderer: Some("AlertsFeedWidget"),
        },
        WidgetDefinition {
            id: "rule_triggers",
            name: "Rule Triggers",
            description: "Trigger counts per monitoring rule",
            category: WidgetCategory::Alerts,
            default_settings: WidgetSettings::new(),
            renderer: None,
        },
        WidgetDefinition {
            id: "cash_forecast_chart",
            name: "Cash Forecast",
            description: "Projected balance over the forecast horizon",
            category: WidgetCategory::Forecast,
            default_settings: settings(&[("weeks", json!(13))]),
            renderer: Some("CashForecastChartWidget"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_sequences_are_exact() {
        assert_eq!(
            preset_widget_ids(Preset::Leader).unwrap(),
            ["cash_runway", "health_status", "next_big_obligation"]
        );
        assert_eq!(
            preset_widget_ids(Preset::FinanceManager).unwrap(),
            [
                "cash_position",
                "cash_runway",
                "obligations_tracker",
                "alerts_feed",
                "net_cash_flow",
                "bank_accounts_overview",
            ]
        );
        assert!(preset_widget_ids(Preset::Custom).is_none());
    }

    #[test]
    fn unknown_widget_resolves_to_nothing() {
        assert!(lookup("does_not_exist").is_none());
        assert!(resolve_card("does_not_exist").is_none());
        assert!(default_settings("does_not_exist").is_empty());
    }

    #[test]
    fn declared_widget_without_renderer_is_not_listed() {
        assert!(lookup("upcoming_payroll").is_some());
        assert!(resolve_card("upcoming_payroll").is_none());

        let ids: Vec<_> = list_by_category(WidgetCategory::Obligations)
            .into_iter()
            .map(|def| def.id)
            .collect();
        assert_eq!(ids, vec!["next_big_obligation", "obligations_tracker"]);
    }

    #[test]
    fn list_by_category_keeps_declaration_order() {
        let ids: Vec<_> = list_by_category(WidgetCategory::Cash)
            .into_iter()
            .map(|def| def.id)
            .collect();
        assert_eq!(
            ids,
            vec!["cash_position", "cash_runway", "net_cash_flow", "bank_accounts_overview"]
        );
    }

    #[test]
    fn every_preset_widget_is_registered() {
        for preset in [Preset::Leader, Preset::FinanceManager] {
            for id in preset_widget_ids(preset).unwrap() {
                assert!(lookup(id).is_some(), "{id} missing from registry");
            }
        }
    }

    #[test]
    fn parses_preset_names() {
        assert_eq!(Preset::parse("finance-manager"), Some(Preset::FinanceManager));
        assert_eq!(Preset::parse("Leader"), Some(Preset::Leader));
        assert_eq!(Preset::parse("board"), None);
    }
}
