use crate::domain::money::{format_gbp, format_number};
use anyhow::{ensure, Context};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleType {
    CashBuffer,
    TaxVatReserve,
    Payroll,
    Receivables,
    UnusualActivity,
}

impl RuleType {
    pub const ALL: [RuleType; 5] = [
        RuleType::CashBuffer,
        RuleType::TaxVatReserve,
        RuleType::Payroll,
        RuleType::Receivables,
        RuleType::UnusualActivity,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "cashbuffer" => Some(Self::CashBuffer),
            "taxvatreserve" | "taxvat" => Some(Self::TaxVatReserve),
            "payroll" => Some(Self::Payroll),
            "receivables" => Some(Self::Receivables),
            "unusualactivity" => Some(Self::UnusualActivity),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RuleType::CashBuffer => "Cash buffer",
            RuleType::TaxVatReserve => "Tax & VAT reserve",
            RuleType::Payroll => "Payroll coverage",
            RuleType::Receivables => "Overdue receivables",
            RuleType::UnusualActivity => "Unusual activity",
        }
    }

    /// Starting parameters offered when a user picks this rule type.
    pub fn default_config(self) -> RuleConfig {
        match self {
            RuleType::CashBuffer => RuleConfig::CashBuffer(CashBufferConfig {
                threshold: CashThreshold::Amount { amount: 50_000.0 },
                period: LookaheadPeriod::OneMonth,
            }),
            RuleType::TaxVatReserve => RuleConfig::TaxVatReserve(TaxVatReserveConfig {
                percentage: 20.0,
                basis: ReserveBasis::IncomingPayments,
                tax_name: "VAT".to_string(),
            }),
            RuleType::Payroll => RuleConfig::Payroll(PayrollConfig {
                alert_days_before: 7,
                payroll_amount: 0.0,
                buffer_amount: 0.0,
            }),
            RuleType::Receivables => RuleConfig::Receivables(ReceivablesConfig {
                min_amount: 1_000.0,
                overdue_days: 30,
            }),
            RuleType::UnusualActivity => RuleConfig::UnusualActivity(UnusualActivityConfig {
                target: "all categories".to_string(),
                lookback_months: 3,
                sensitivity: Sensitivity::Moderate,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ruleType", rename_all = "camelCase")]
pub enum RuleConfig {
    CashBuffer(CashBufferConfig),
    TaxVatReserve(TaxVatReserveConfig),
    Payroll(PayrollConfig),
    Receivables(ReceivablesConfig),
    UnusualActivity(UnusualActivityConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashBufferConfig {
    pub threshold: CashThreshold,
    pub period: LookaheadPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CashThreshold {
    Amount { amount: f64 },
    DaysOfExpenses { days: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LookaheadPeriod {
    TwoWeeks,
    OneMonth,
    ThreeMonths,
}

impl LookaheadPeriod {
    pub fn label(self) -> &'static str {
        match self {
            LookaheadPeriod::TwoWeeks => "2 weeks",
            LookaheadPeriod::OneMonth => "1 month",
            LookaheadPeriod::ThreeMonths => "3 months",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxVatReserveConfig {
    pub percentage: f64,
    pub basis: ReserveBasis,
    pub tax_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReserveBasis {
    IncomingPayments,
    Revenue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayrollConfig {
    pub alert_days_before: u32,
    pub payroll_amount: f64,
    #[serde(default)]
    pub buffer_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivablesConfig {
    pub min_amount: f64,
    pub overdue_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnusualActivityConfig {
    pub target: String,
    pub lookback_months: u32,
    pub sensitivity: Sensitivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "camelCase")]
pub enum Sensitivity {
    Conservative,
    Moderate,
    Sensitive,
    Custom { percent: f64 },
}

impl Sensitivity {
    pub fn percent(&self) -> f64 {
        match self {
            Sensitivity::Conservative => 50.0,
            Sensitivity::Moderate => 25.0,
            Sensitivity::Sensitive => 10.0,
            Sensitivity::Custom { percent } => *percent,
        }
    }
}

impl RuleConfig {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleConfig::CashBuffer(_) => RuleType::CashBuffer,
            RuleConfig::TaxVatReserve(_) => RuleType::TaxVatReserve,
            RuleConfig::Payroll(_) => RuleType::Payroll,
            RuleConfig::Receivables(_) => RuleType::Receivables,
            RuleConfig::UnusualActivity(_) => RuleType::UnusualActivity,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            RuleConfig::CashBuffer(c) => match c.threshold {
                CashThreshold::Amount { amount } => {
                    ensure!(amount > 0.0, "cash buffer amount must be positive (got {amount})")
                }
                CashThreshold::DaysOfExpenses { days } => {
                    ensure!(days >= 1, "days of expenses must be at least 1")
                }
            },
            RuleConfig::TaxVatReserve(c) => {
                ensure!(
                    c.percentage > 0.0 && c.percentage <= 100.0,
                    "reserve percentage must be in (0, 100] (got {})",
                    c.percentage
                );
                ensure!(!c.tax_name.trim().is_empty(), "tax name must be non-empty");
            }
            RuleConfig::Payroll(c) => {
                ensure!(c.alert_days_before >= 1, "alert days before must be at least 1");
                ensure!(
                    c.payroll_amount > 0.0,
                    "payroll amount must be positive (got {})",
                    c.payroll_amount
                );
                ensure!(
                    c.buffer_amount >= 0.0,
                    "buffer amount must not be negative (got {})",
                    c.buffer_amount
                );
            }
            RuleConfig::Receivables(c) => {
                ensure!(c.min_amount >= 0.0, "minimum amount must not be negative");
                ensure!(c.overdue_days >= 1, "overdue days must be at least 1");
            }
            RuleConfig::UnusualActivity(c) => {
                ensure!(!c.target.trim().is_empty(), "target must be non-empty");
                ensure!(
                    (1..=24).contains(&c.lookback_months),
                    "lookback months must be 1..=24 (got {})",
                    c.lookback_months
                );
                ensure!(
                    c.sensitivity.percent() > 0.0,
                    "sensitivity percent must be positive"
                );
            }
        }
        Ok(())
    }

    /// Applies a partial config. Top-level keys override, absent keys are
    /// retained. A patch naming another `ruleType` replaces the config so a
    /// rule never carries fields from two shapes.
    pub fn merged_with(&self, patch: &Map<String, Value>) -> anyhow::Result<RuleConfig> {
        let current = serde_json::to_value(self).context("serialize rule config failed")?;
        let Value::Object(mut base) = current else {
            anyhow::bail!("rule config did not serialize to an object");
        };

        let switches_type = patch
            .get("ruleType")
            .is_some_and(|t| Some(t) != base.get("ruleType"));
        if switches_type {
            base = Map::new();
        }
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }

        serde_json::from_value::<RuleConfig>(Value::Object(base))
            .context("rule config patch does not match any rule type")
    }
}

/// Human-readable summary of a rule. Pure: the same config always produces the
/// same string.
pub fn generate_rule_description(config: &RuleConfig) -> String {
    match config {
        RuleConfig::CashBuffer(c) => {
            let threshold = match c.threshold {
                CashThreshold::Amount { amount } => format_gbp(amount),
                CashThreshold::DaysOfExpenses { days } => format!("{days} days of expenses"),
            };
            format!(
                "Alert when projected cash in the next {} falls below {threshold}",
                c.period.label()
            )
        }
        RuleConfig::TaxVatReserve(c) => {
            let basis = match c.basis {
                ReserveBasis::IncomingPayments => "incoming payments",
                ReserveBasis::Revenue => "revenue",
            };
            format!(
                "Set aside {}% of {basis} for {}",
                format_number(c.percentage),
                c.tax_name
            )
        }
        RuleConfig::Payroll(c) => {
            let mut out = format!(
                "Alert {} days before payday if projected cash won't cover {}",
                c.alert_days_before,
                format_gbp(c.payroll_amount)
            );
            if c.buffer_amount > 0.0 {
                out.push_str(&format!(" plus {} buffer", format_gbp(c.buffer_amount)));
            }
            out
        }
        RuleConfig::Receivables(c) => format!(
            "Alert when invoices over {} are more than {} days overdue",
            format_gbp(c.min_amount),
            c.overdue_days
        ),
        RuleConfig::UnusualActivity(c) => format!(
            "Alert when spending in {} exceeds the {}-month average by more than {}%",
            c.target,
            c.lookback_months,
            format_number(c.sensitivity.percent())
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertFrequency {
    Immediately,
    DailyDigest,
    WeeklyDigest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPreferences {
    pub show_in_feed: bool,
    pub send_email: bool,
    pub send_slack: bool,
    pub frequency: AlertFrequency,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            show_in_feed: true,
            send_email: false,
            send_slack: false,
            frequency: AlertFrequency::Immediately,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPreferencesPatch {
    pub show_in_feed: Option<bool>,
    pub send_email: Option<bool>,
    pub send_slack: Option<bool>,
    pub frequency: Option<AlertFrequency>,
}

impl AlertPreferences {
    fn merge(&mut self, patch: &AlertPreferencesPatch) {
        if let Some(v) = patch.show_in_feed {
            self.show_in_feed = v;
        }
        if let Some(v) = patch.send_email {
            self.send_email = v;
        }
        if let Some(v) = patch.send_slack {
            self.send_slack = v;
        }
        if let Some(v) = patch.frequency {
            self.frequency = v;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: String,
    pub config: RuleConfig,
    pub alert_preferences: AlertPreferences,
    pub status: RuleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: RuleConfig,
    #[serde(default)]
    pub alert_preferences: AlertPreferences,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<Map<String, Value>>,
    pub alert_preferences: Option<AlertPreferencesPatch>,
}

impl Rule {
    pub fn create(user_id: &str, input: NewRule, now: DateTime<Utc>) -> anyhow::Result<Self> {
        let name = input.name.trim().to_string();
        ensure!(!name.is_empty(), "rule name must be non-empty");
        input.config.validate()?;

        let description = input
            .description
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| generate_rule_description(&input.config));

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name,
            description,
            config: input.config,
            alert_preferences: input.alert_preferences,
            status: RuleStatus::Active,
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
            trigger_count: 0,
        })
    }

    pub fn rule_type(&self) -> RuleType {
        self.config.rule_type()
    }

    /// Validates the whole update before touching `self`, so a rejected update
    /// leaves the rule unchanged.
    pub fn apply_update(&mut self, update: &RuleUpdate, now: DateTime<Utc>) -> anyhow::Result<()> {
        let name = match &update.name {
            Some(name) => {
                let name = name.trim().to_string();
                ensure!(!name.is_empty(), "rule name must be non-empty");
                Some(name)
            }
            None => None,
        };

        let config = match &update.config {
            Some(patch) => {
                let merged = self.config.merged_with(patch)?;
                merged.validate()?;
                Some(merged)
            }
            None => None,
        };

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(prefs) = &update.alert_preferences {
            self.alert_preferences.merge(prefs);
        }

        let config_changed = config.as_ref().is_some_and(|c| *c != self.config);
        if let Some(config) = config {
            self.config = config;
        }

        match &update.description {
            Some(description) => self.description = description.trim().to_string(),
            None if config_changed => self.description = generate_rule_description(&self.config),
            None => {}
        }

        self.updated_at = now;
        Ok(())
    }

    pub fn duplicate(&self, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: format!("{} (Copy)", self.name),
            created_at: now,
            updated_at: now,
            last_triggered_at: None,
            trigger_count: 0,
            ..self.clone()
        }
    }

    pub fn toggle_status(&mut self, now: DateTime<Utc>) {
        self.status = match self.status {
            RuleStatus::Active => RuleStatus::Paused,
            RuleStatus::Paused => RuleStatus::Active,
        };
        self.updated_at = now;
    }

    /// Calendar date of the last trigger as seen from `offset`. With a zero
    /// offset this is the `YYYY-MM-DD` prefix of the UTC timestamp.
    pub fn triggered_on(&self, day: NaiveDate, offset: FixedOffset) -> bool {
        self.last_triggered_at
            .is_some_and(|at| at.with_timezone(&offset).date_naive() == day)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleFilter {
    All,
    Active,
    TriggeredToday,
}

impl RuleFilter {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "all" => Some(Self::All),
            "active" => Some(Self::Active),
            "triggeredtoday" | "today" => Some(Self::TriggeredToday),
            _ => None,
        }
    }
}

pub fn filter_rules<'a>(
    rules: &'a [Rule],
    filter: RuleFilter,
    today: NaiveDate,
    offset: FixedOffset,
) -> Vec<&'a Rule> {
    rules
        .iter()
        .filter(|rule| match filter {
            RuleFilter::All => true,
            RuleFilter::Active => rule.status == RuleStatus::Active,
            RuleFilter::TriggeredToday => rule.triggered_on(today, offset),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    Type,
    Config,
    Alerts,
}

/// Three-step rule authoring flow: pick a type, tune its parameters, choose
/// how alerts are delivered.
#[derive(Debug, Clone)]
pub struct RuleWizard {
    step: WizardStep,
    name: Option<String>,
    config: Option<RuleConfig>,
    alert_preferences: AlertPreferences,
}

impl Default for RuleWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Type,
            name: None,
            config: None,
            alert_preferences: AlertPreferences::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn config(&self) -> Option<&RuleConfig> {
        self.config.as_ref()
    }

    /// Picking the same type again keeps the parameters already entered.
    pub fn select_type(&mut self, rule_type: RuleType) {
        if self.config.as_ref().map(RuleConfig::rule_type) != Some(rule_type) {
            self.config = Some(rule_type.default_config());
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn set_config(&mut self, config: RuleConfig) {
        self.config = Some(config);
    }

    pub fn set_alert_preferences(&mut self, prefs: AlertPreferences) {
        self.alert_preferences = prefs;
    }

    pub fn next(&mut self) -> anyhow::Result<WizardStep> {
        self.step = match self.step {
            WizardStep::Type => {
                ensure!(self.config.is_some(), "choose a rule type first");
                WizardStep::Config
            }
            WizardStep::Config => {
                self.config
                    .as_ref()
                    .context("choose a rule type first")?
                    .validate()?;
                WizardStep::Alerts
            }
            WizardStep::Alerts => WizardStep::Alerts,
        };
        Ok(self.step)
    }

    pub fn back(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::Type | WizardStep::Config => WizardStep::Type,
            WizardStep::Alerts => WizardStep::Config,
        };
        self.step
    }

    pub fn finish(self) -> anyhow::Result<NewRule> {
        ensure!(
            self.step == WizardStep::Alerts,
            "rule wizard is not on its final step"
        );
        let config = self.config.context("choose a rule type first")?;
        config.validate()?;
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| config.rule_type().label().to_string());

        Ok(NewRule {
            name,
            description: None,
            config,
            alert_preferences: self.alert_preferences,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn payroll(days: u32, amount: f64, buffer: f64) -> RuleConfig {
        RuleConfig::Payroll(PayrollConfig {
            alert_days_before: days,
            payroll_amount: amount,
            buffer_amount: buffer,
        })
    }

    fn new_rule(config: RuleConfig) -> NewRule {
        NewRule {
            name: "Payroll watch".to_string(),
            description: None,
            config,
            alert_preferences: AlertPreferences::default(),
        }
    }

    #[test]
    fn payroll_description_without_buffer() {
        let config = payroll(7, 23_500.0, 0.0);
        let first = generate_rule_description(&config);
        assert_eq!(
            first,
            "Alert 7 days before payday if projected cash won't cover £23,500"
        );
        assert_eq!(first, generate_rule_description(&config));
    }

    #[test]
    fn payroll_description_with_buffer() {
        assert_eq!(
            generate_rule_description(&payroll(3, 40_000.0, 5_000.0)),
            "Alert 3 days before payday if projected cash won't cover £40,000 plus £5,000 buffer"
        );
    }

    #[test]
    fn cash_buffer_descriptions() {
        let amount = RuleConfig::CashBuffer(CashBufferConfig {
            threshold: CashThreshold::Amount { amount: 50_000.0 },
            period: LookaheadPeriod::TwoWeeks,
        });
        assert_eq!(
            generate_rule_description(&amount),
            "Alert when projected cash in the next 2 weeks falls below £50,000"
        );

        let days = RuleConfig::CashBuffer(CashBufferConfig {
            threshold: CashThreshold::DaysOfExpenses { days: 45 },
            period: LookaheadPeriod::ThreeMonths,
        });
        assert_eq!(
            generate_rule_description(&days),
            "Alert when projected cash in the next 3 months falls below 45 days of expenses"
        );
    }

    #[test]
    fn tax_receivables_and_unusual_activity_descriptions() {
        let tax = RuleConfig::TaxVatReserve(TaxVatReserveConfig {
            percentage: 20.0,
            basis: ReserveBasis::IncomingPayments,
            tax_name: "VAT".to_string(),
        });
        assert_eq!(
            generate_rule_description(&tax),
            "Set aside 20% of incoming payments for VAT"
        );

        let corp = RuleConfig::TaxVatReserve(TaxVatReserveConfig {
            percentage: 12.5,
            basis: ReserveBasis::Revenue,
            tax_name: "Corporation Tax".to_string(),
        });
        assert_eq!(
            generate_rule_description(&corp),
            "Set aside 12.5% of revenue for Corporation Tax"
        );

        let receivables = RuleConfig::Receivables(ReceivablesConfig {
            min_amount: 5_000.0,
            overdue_days: 30,
        });
        assert_eq!(
            generate_rule_description(&receivables),
            "Alert when invoices over £5,000 are more than 30 days overdue"
        );

        let unusual = |sensitivity| {
            generate_rule_description(&RuleConfig::UnusualActivity(UnusualActivityConfig {
                target: "Software".to_string(),
                lookback_months: 3,
                sensitivity,
            }))
        };
        assert_eq!(
            unusual(Sensitivity::Conservative),
            "Alert when spending in Software exceeds the 3-month average by more than 50%"
        );
        assert!(unusual(Sensitivity::Moderate).ends_with("by more than 25%"));
        assert!(unusual(Sensitivity::Sensitive).ends_with("by more than 10%"));
        assert!(unusual(Sensitivity::Custom { percent: 35.0 }).ends_with("by more than 35%"));
    }

    #[test]
    fn config_json_is_tagged_by_rule_type() {
        let value = serde_json::to_value(payroll(7, 23_500.0, 0.0)).unwrap();
        assert_eq!(
            value,
            json!({
                "ruleType": "payroll",
                "alertDaysBefore": 7,
                "payrollAmount": 23500.0,
                "bufferAmount": 0.0,
            })
        );

        let unknown = json!({"ruleType": "fxExposure", "currency": "USD"});
        assert!(serde_json::from_value::<RuleConfig>(unknown).is_err());
    }

    #[test]
    fn create_sets_defaults_and_synthesizes_description() {
        let rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        assert_eq!(rule.status, RuleStatus::Active);
        assert_eq!(rule.trigger_count, 0);
        assert!(rule.last_triggered_at.is_none());
        assert_eq!(rule.rule_type(), RuleType::Payroll);
        assert_eq!(
            rule.description,
            "Alert 7 days before payday if projected cash won't cover £23,500"
        );
    }

    #[test]
    fn create_rejects_invalid_input() {
        let mut input = new_rule(payroll(7, 23_500.0, 0.0));
        input.name = "   ".to_string();
        assert!(Rule::create("user-1", input, now()).is_err());
        assert!(Rule::create("user-1", new_rule(payroll(7, 0.0, 0.0)), now()).is_err());
    }

    #[test]
    fn partial_config_update_keeps_other_fields_and_regenerates_description() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        let patch = json!({"bufferAmount": 2000}).as_object().unwrap().clone();
        rule.apply_update(
            &RuleUpdate {
                config: Some(patch),
                ..Default::default()
            },
            now(),
        )
        .unwrap();

        assert_eq!(rule.config, payroll(7, 23_500.0, 2_000.0));
        assert_eq!(
            rule.description,
            "Alert 7 days before payday if projected cash won't cover £23,500 plus £2,000 buffer"
        );
    }

    #[test]
    fn explicit_description_wins_over_regeneration() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        let patch = json!({"alertDaysBefore": 3}).as_object().unwrap().clone();
        rule.apply_update(
            &RuleUpdate {
                description: Some("Payroll early warning".to_string()),
                config: Some(patch),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(rule.description, "Payroll early warning");
    }

    #[test]
    fn unchanged_config_keeps_custom_description() {
        let mut input = new_rule(payroll(7, 23_500.0, 0.0));
        input.description = Some("Mine".to_string());
        let mut rule = Rule::create("user-1", input, now()).unwrap();
        let patch = json!({"alertDaysBefore": 7}).as_object().unwrap().clone();
        rule.apply_update(
            &RuleUpdate {
                config: Some(patch),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(rule.description, "Mine");
    }

    #[test]
    fn switching_rule_type_replaces_config() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        let patch = json!({"ruleType": "receivables", "minAmount": 500, "overdueDays": 14})
            .as_object()
            .unwrap()
            .clone();
        rule.apply_update(
            &RuleUpdate {
                config: Some(patch),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert_eq!(rule.rule_type(), RuleType::Receivables);

        let stored = serde_json::to_value(&rule.config).unwrap();
        assert!(stored.get("payrollAmount").is_none());
    }

    #[test]
    fn rejected_update_leaves_rule_untouched() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        let before = rule.clone();
        let patch = json!({"payrollAmount": -1}).as_object().unwrap().clone();
        let res = rule.apply_update(
            &RuleUpdate {
                name: Some("Renamed".to_string()),
                config: Some(patch),
                ..Default::default()
            },
            now(),
        );
        assert!(res.is_err());
        assert_eq!(rule, before);
    }

    #[test]
    fn alert_preferences_merge_one_level() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        rule.apply_update(
            &RuleUpdate {
                alert_preferences: Some(AlertPreferencesPatch {
                    send_slack: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            now(),
        )
        .unwrap();
        assert!(rule.alert_preferences.send_slack);
        assert!(rule.alert_preferences.show_in_feed);
        assert_eq!(rule.alert_preferences.frequency, AlertFrequency::Immediately);
    }

    #[test]
    fn duplicate_resets_identity_and_history() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        rule.trigger_count = 4;
        rule.last_triggered_at = Some(now());
        let later = now() + chrono::Duration::hours(1);

        let copy = rule.duplicate(later);
        assert_ne!(copy.id, rule.id);
        assert_eq!(copy.name, "Payroll watch (Copy)");
        assert_eq!(copy.trigger_count, 0);
        assert!(copy.last_triggered_at.is_none());
        assert_eq!(copy.created_at, later);
        assert_eq!(copy.config, rule.config);
        assert_eq!(copy.description, rule.description);
    }

    #[test]
    fn toggle_keeps_trigger_history() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        rule.trigger_count = 2;
        rule.last_triggered_at = Some(now());
        rule.toggle_status(now());
        assert_eq!(rule.status, RuleStatus::Paused);
        rule.toggle_status(now());
        assert_eq!(rule.status, RuleStatus::Active);
        assert_eq!(rule.trigger_count, 2);
        assert_eq!(rule.last_triggered_at, Some(now()));
    }

    #[test]
    fn triggered_today_matches_utc_date_only() {
        let mut rule = Rule::create("user-1", new_rule(payroll(7, 23_500.0, 0.0)), now()).unwrap();
        rule.last_triggered_at = Some("2024-01-15T09:00:00Z".parse().unwrap());
        let rules = vec![rule];
        let utc = FixedOffset::east_opt(0).unwrap();

        let on = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let off = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        assert_eq!(filter_rules(&rules, RuleFilter::TriggeredToday, on, utc).len(), 1);
        assert!(filter_rules(&rules, RuleFilter::TriggeredToday, off, utc).is_empty());
        assert_eq!(filter_rules(&rules, RuleFilter::All, off, utc).len(), 1);
    }

    #[test]
    fn wizard_walks_three_steps() {
        let mut wizard = RuleWizard::new();
        assert!(wizard.next().is_err());

        wizard.select_type(RuleType::Payroll);
        assert_eq!(wizard.next().unwrap(), WizardStep::Config);
        // Default payroll amount is zero and must be filled in.
        assert!(wizard.next().is_err());

        wizard.set_config(payroll(5, 18_000.0, 0.0));
        assert_eq!(wizard.next().unwrap(), WizardStep::Alerts);
        assert_eq!(wizard.back(), WizardStep::Config);
        assert_eq!(wizard.next().unwrap(), WizardStep::Alerts);

        let input = wizard.finish().unwrap();
        assert_eq!(input.name, "Payroll coverage");
        assert_eq!(input.config, payroll(5, 18_000.0, 0.0));
    }

    #[test]
    fn wizard_reselecting_type_keeps_entered_config() {
        let mut wizard = RuleWizard::new();
        wizard.select_type(RuleType::Payroll);
        wizard.set_config(payroll(5, 18_000.0, 0.0));
        wizard.select_type(RuleType::Payroll);
        assert_eq!(wizard.config(), Some(&payroll(5, 18_000.0, 0.0)));
        wizard.select_type(RuleType::Receivables);
        assert_eq!(wizard.config().map(RuleConfig::rule_type), Some(RuleType::Receivables));
    }

    #[test]
    fn wizard_finish_requires_last_step() {
        let mut wizard = RuleWizard::new();
        wizard.select_type(RuleType::Receivables);
        wizard.next().unwrap();
        assert!(wizard.finish().is_err());
    }

    #[test]
    fn rule_type_parses_wire_and_cli_spellings() {
        assert_eq!(RuleType::parse("cashBuffer"), Some(RuleType::CashBuffer));
        assert_eq!(RuleType::parse("tax-vat-reserve"), Some(RuleType::TaxVatReserve));
        assert_eq!(RuleType::parse("unusual_activity"), Some(RuleType::UnusualActivity));
        assert_eq!(RuleType::parse("budget"), None);
    }
}
