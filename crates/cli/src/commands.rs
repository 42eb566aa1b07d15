use crate::session::Session;
use crate::{ActionsCommand, Command, DashboardCommand, RulesCommand, ScenariosCommand};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tamio_core::api::sse::ChatEvent;
use tamio_core::api::types::{ActionItem, ChatRequest};
use tamio_core::domain::forecast::{ChartPoint, Granularity, TimeRange};
use tamio_core::domain::money::format_gbp;
use tamio_core::domain::rule::{
    generate_rule_description, NewRule, Rule, RuleConfig, RuleFilter, RuleType, RuleUpdate,
    RuleWizard,
};
use tamio_core::domain::widget::{self, Preset, WidgetCategory, WidgetSettings};
use tamio_core::store::dashboard::DashboardStore;
use tamio_core::store::forecast::UnifiedForecastStore;
use tamio_core::time::local_day;

pub async fn run(session: &Session, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Dashboard { command } => dashboard(session, command).await,
        Command::Rules { command } => rules(session, command).await,
        Command::Forecast {
            weeks,
            monthly,
            hide,
        } => forecast(session, weeks, monthly, &hide).await,
        Command::Scenarios { command } => scenarios(session, command).await,
        Command::Actions { command } => actions(session, command).await,
        Command::Risks => {
            for risk in session.api()?.fetch_risks(&session.user_id).await? {
                println!("[{:?}] {} ({})", risk.severity, risk.title, risk.id);
            }
            Ok(())
        }
        Command::Controls => {
            for control in session.api()?.fetch_controls(&session.user_id).await? {
                let state = if control.active { "active" } else { "inactive" };
                let checked = control
                    .last_checked_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{} ({state}, last checked {checked})", control.name);
            }
            Ok(())
        }
        Command::Chat {
            message,
            session: chat_session,
        } => chat(session, message, chat_session).await,
    }
}

async fn dashboard(session: &Session, command: DashboardCommand) -> anyhow::Result<()> {
    if let DashboardCommand::Widgets { category } = &command {
        let categories = match category.as_deref() {
            Some(raw) => vec![WidgetCategory::parse(raw)
                .with_context(|| format!("unknown widget category: {raw}"))?],
            None => vec![
                WidgetCategory::Cash,
                WidgetCategory::Health,
                WidgetCategory::Obligations,
                WidgetCategory::Alerts,
                WidgetCategory::Forecast,
            ],
        };
        for category in categories {
            for def in widget::list_by_category(category) {
                println!("{:<24} {:<12} {}", def.id, format!("{category:?}"), def.description);
            }
        }
        return Ok(());
    }

    let store = session.dashboard().await;
    match command {
        DashboardCommand::Widgets { .. } | DashboardCommand::Show => {}
        DashboardCommand::Add { widget_id } => {
            let instance_id = store
                .add_widget(&widget_id)
                .with_context(|| format!("unknown widget id: {widget_id}"))?;
            println!("added {widget_id} as {instance_id}");
        }
        DashboardCommand::Remove { instance_id } => {
            report(store.remove_widget(&instance_id), "no widget instance with that id");
        }
        DashboardCommand::Move { from, to } => {
            report(store.reorder_widgets(from, to), "positions out of range; layout unchanged");
        }
        DashboardCommand::Reset { preset } => {
            let preset =
                Preset::parse(&preset).with_context(|| format!("unknown preset: {preset}"))?;
            report(
                store.reset_to_preset(preset),
                "custom has no canned layout; layout unchanged",
            );
        }
        DashboardCommand::Set {
            instance_id,
            key,
            value,
        } => {
            let value = parse_setting_value(value);
            let mut patch = WidgetSettings::new();
            patch.insert(key, value);
            report(
                store.update_widget_settings(&instance_id, patch),
                "no widget instance with that id",
            );
        }
    }

    print_dashboard(&store);
    store.flush().await;
    Ok(())
}

fn print_dashboard(store: &DashboardStore) {
    let state = store.snapshot();
    let modified = if state.dirty { " (modified)" } else { "" };
    println!("preset: {:?}{modified}", state.active_preset);
    for (idx, instance) in state.widgets.iter().enumerate() {
        let name = widget::resolve_card(&instance.widget_id)
            .map(|def| def.name)
            .unwrap_or("(not rendered)");
        println!("{idx:>2}. {:<24} {:<28} {}", instance.widget_id, name, instance.instance_id);
    }
}

async fn rules(session: &Session, command: RulesCommand) -> anyhow::Result<()> {
    let store = session.rules().await?;
    match command {
        RulesCommand::List { filter, today } => {
            let parsed = RuleFilter::parse(&filter)
                .with_context(|| format!("unknown rule filter: {filter}"))?;
            let today =
                local_day::resolve_today(today.as_deref(), chrono::Utc::now(), store.offset())?;
            for rule in store.filtered_rules_on(parsed, today) {
                print_rule(&rule);
            }
        }
        RulesCommand::Create {
            file,
            rule_type,
            name,
        } => {
            let mut input = match (file, rule_type) {
                (Some(file), _) => read_json::<NewRule>(&file)?,
                (None, Some(raw)) => {
                    let rule_type =
                        RuleType::parse(&raw).with_context(|| format!("unknown rule type: {raw}"))?;
                    let mut wizard = RuleWizard::new();
                    wizard.select_type(rule_type);
                    wizard.next()?;
                    wizard.next()?;
                    wizard.finish()?
                }
                (None, None) => anyhow::bail!("pass --file or --type"),
            };
            if let Some(name) = name {
                input.name = name;
            }
            print_rule(&store.create_rule(input)?);
        }
        RulesCommand::Update { id, file } => {
            let update = read_json::<RuleUpdate>(&file)?;
            let rule = store
                .update_rule(&id, &update)?
                .with_context(|| format!("no rule with id {id}"))?;
            print_rule(&rule);
        }
        RulesCommand::Toggle { id } => {
            let status = store
                .toggle_rule_status(&id)
                .with_context(|| format!("no rule with id {id}"))?;
            println!("{id}: {status:?}");
        }
        RulesCommand::Duplicate { id } => {
            let copy = store
                .duplicate_rule(&id)
                .with_context(|| format!("no rule with id {id}"))?;
            print_rule(&copy);
        }
        RulesCommand::Delete { id } => report(store.delete_rule(&id), "no rule with that id"),
        RulesCommand::Trigger { id } => {
            report(store.record_trigger(&id, chrono::Utc::now()), "no rule with that id")
        }
        RulesCommand::Describe { file } => {
            let config = read_json::<RuleConfig>(&file)?;
            config.validate()?;
            println!("{}", generate_rule_description(&config));
        }
    }
    store.flush().await;
    Ok(())
}

fn print_rule(rule: &Rule) {
    let last = rule
        .last_triggered_at
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    println!(
        "{} [{:?}] {} - {} (triggered {}x, last {last})",
        rule.id, rule.status, rule.name, rule.description, rule.trigger_count
    );
}

/// `dashboard set` values are JSON when they parse, plain strings otherwise.
fn parse_setting_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn parse_time_range(weeks: u32) -> anyhow::Result<TimeRange> {
    TimeRange::from_weeks(weeks)
        .with_context(|| format!("--weeks must be 13, 26 or 52 (got {weeks})"))
}

async fn open_forecast(store: &UnifiedForecastStore, weeks: u32) -> anyhow::Result<()> {
    let range = parse_time_range(weeks)?;
    if !store.set_time_range(range).await? {
        store.refresh_forecast().await?;
    }
    Ok(())
}

async fn forecast(
    session: &Session,
    weeks: u32,
    monthly: bool,
    hide: &[String],
) -> anyhow::Result<()> {
    let store = session.forecast()?;
    open_forecast(&store, weeks).await?;
    for id in hide {
        if !store.toggle_category(id) {
            tracing::warn!(category = %id, "unknown category filter");
        }
    }
    if monthly {
        store.set_granularity(Granularity::Monthly);
    }

    print_points(&store.chart_points());
    for filter in store.snapshot().categories {
        let mark = if filter.visible { "x" } else { " " };
        println!("[{mark}] {}", filter.id);
    }
    Ok(())
}

fn print_points(points: &[ChartPoint]) {
    for point in points {
        let overlays = point
            .overlays
            .iter()
            .map(|o| format!("{} {}={}", o.color, o.scenario_id, format_gbp(o.balance)))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "wk{:>2} {} in {:>10} out {:>10} balance {:>10} {overlays}",
            point.week_number,
            point.week_start,
            format_gbp(point.cash_in),
            format_gbp(point.cash_out),
            format_gbp(point.balance),
        );
    }
}

async fn scenarios(session: &Session, command: ScenariosCommand) -> anyhow::Result<()> {
    let api = session.api()?;
    match command {
        ScenariosCommand::List => {
            for scenario in api.list_scenarios(&session.user_id).await? {
                println!("{} [{:?}] {}", scenario.id, scenario.status, scenario.name);
            }
        }
        ScenariosCommand::Suggestions => {
            for suggestion in api.fetch_scenario_suggestions(&session.user_id).await? {
                println!("{}: {}", suggestion.name, suggestion.reason);
            }
        }
        ScenariosCommand::Compare { ids, weeks } => {
            let store = UnifiedForecastStore::new(&session.user_id, Arc::clone(&api));
            open_forecast(&store, weeks).await?;
            let saved = api.list_scenarios(&session.user_id).await?;
            for id in &ids {
                let Some(scenario) = saved.iter().find(|s| &s.id == id) else {
                    tracing::warn!(scenario_id = %id, "no saved scenario with that id");
                    continue;
                };
                if !store.apply_scenario_from_api(scenario).await? {
                    println!("{id}: not applied (already showing or five overlays active)");
                }
            }

            for applied in store.snapshot().scenarios.applied() {
                let lowest = applied
                    .comparison
                    .lowest_scenario_balance()
                    .map(format_gbp)
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {} (lowest balance {lowest})", applied.color, applied.name);
            }
            print_points(&store.chart_points());
        }
        ScenariosCommand::Delete { id } => {
            api.delete_scenario(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn actions(session: &Session, command: ActionsCommand) -> anyhow::Result<()> {
    let api = session.api()?;
    match command {
        ActionsCommand::List => {
            for action in api.list_actions(&session.user_id).await? {
                print_action(&action);
            }
        }
        ActionsCommand::Approve { id } => print_action(&api.approve_action(&id).await?),
        ActionsCommand::Skip { id } => print_action(&api.skip_action(&id).await?),
        ActionsCommand::Override { id, note } => {
            print_action(&api.override_action(&id, &note).await?)
        }
    }
    Ok(())
}

fn print_action(action: &ActionItem) {
    let amount = action.amount.map(format_gbp).unwrap_or_default();
    let due = action
        .due_date
        .map(|d| d.to_string())
        .unwrap_or_default();
    println!(
        "{} [{:?}] {} {amount} {due}",
        action.id, action.status, action.title
    );
}

async fn chat(
    session: &Session,
    message: String,
    chat_session: Option<String>,
) -> anyhow::Result<()> {
    let request = ChatRequest {
        user_id: session.user_id.clone(),
        message,
        session_id: chat_session,
    };
    let mut on_event = |event: &ChatEvent| {
        if let ChatEvent::Chunk { content } = event {
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
    };
    let outcome = session.api()?.stream_chat(&request, &mut on_event).await?;
    println!();
    eprintln!("session: {}", outcome.session_id);
    Ok(())
}

fn report(changed: bool, unchanged: &str) {
    if !changed {
        println!("{unchanged}");
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} does not match the expected shape", path.display()))
}
