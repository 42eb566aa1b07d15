pub mod error;
pub mod http;
pub mod sse;
pub mod types;

use crate::api::sse::ChatEvent;
use crate::api::types::{ActionItem, ChatOutcome, ChatRequest, Control, Risk};
use crate::domain::forecast::Forecast;
use crate::domain::scenario::{NewScenario, Scenario, ScenarioComparison, ScenarioSuggestion};

/// Remote backend capabilities consumed by the client stores. Forecasting,
/// detection and execution happen server-side.
#[async_trait::async_trait]
pub trait TamioApi: Send + Sync {
    async fn fetch_forecast(&self, user_id: &str, weeks: u32) -> anyhow::Result<Forecast>;

    async fn list_scenarios(&self, user_id: &str) -> anyhow::Result<Vec<Scenario>>;

    async fn create_scenario(
        &self,
        user_id: &str,
        input: &NewScenario,
    ) -> anyhow::Result<Scenario>;

    async fn update_scenario(&self, scenario: &Scenario) -> anyhow::Result<Scenario>;

    async fn delete_scenario(&self, scenario_id: &str) -> anyhow::Result<()>;

    async fn fetch_scenario_comparison(
        &self,
        scenario_id: &str,
        weeks: u32,
    ) -> anyhow::Result<ScenarioComparison>;

    async fn fetch_scenario_suggestions(
        &self,
        user_id: &str,
    ) -> anyhow::Result<Vec<ScenarioSuggestion>>;

    async fn list_actions(&self, user_id: &str) -> anyhow::Result<Vec<ActionItem>>;

    async fn approve_action(&self, action_id: &str) -> anyhow::Result<ActionItem>;

    async fn skip_action(&self, action_id: &str) -> anyhow::Result<ActionItem>;

    async fn override_action(&self, action_id: &str, note: &str) -> anyhow::Result<ActionItem>;

    async fn fetch_risks(&self, user_id: &str) -> anyhow::Result<Vec<Risk>>;

    async fn fetch_controls(&self, user_id: &str) -> anyhow::Result<Vec<Control>>;

    /// Streams a chat reply, calling `on_event` for every event, and returns
    /// the accumulated text with the session id from the terminal event.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_event: &mut (dyn for<'e> FnMut(&'e ChatEvent) + Send),
    ) -> anyhow::Result<ChatOutcome>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::domain::forecast::fixtures::event;
    use crate::domain::forecast::{CashDirection, ForecastWeek};
    use crate::domain::scenario::ComparisonWeek;
    use chrono::NaiveDate;
    use std::time::Duration;

    /// Forecast with `weeks` flat weeks; each fetch sleeps `latency(weeks)`.
    pub struct StubApi {
        pub latency: fn(u32) -> Duration,
        pub fail_forecast: bool,
    }

    impl Default for StubApi {
        fn default() -> Self {
            Self {
                latency: |_| Duration::ZERO,
                fail_forecast: false,
            }
        }
    }

    /// `weeks` weeks holding 10k, each with 1k of Sales in and 1k of Rent out.
    pub fn flat_forecast(weeks: u32) -> Forecast {
        let start = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        Forecast {
            starting_cash: 10_000.0,
            weeks: (1..=weeks)
                .map(|n| {
                    let week_start = start + chrono::Duration::weeks(i64::from(n) - 1);
                    ForecastWeek {
                        week_number: n,
                        week_start,
                        starting_balance: 10_000.0,
                        cash_in: 1_000.0,
                        cash_out: 1_000.0,
                        net_change: 0.0,
                        ending_balance: 10_000.0,
                        events: vec![
                            event(
                                &format!("in{n}"),
                                week_start,
                                1_000.0,
                                CashDirection::In,
                                "Sales",
                            ),
                            event(
                                &format!("out{n}"),
                                week_start,
                                1_000.0,
                                CashDirection::Out,
                                "Rent",
                            ),
                        ],
                    }
                })
                .collect(),
            summary: None,
        }
    }

    #[async_trait::async_trait]
    impl TamioApi for StubApi {
        async fn fetch_forecast(&self, _user_id: &str, weeks: u32) -> anyhow::Result<Forecast> {
            tokio::time::sleep((self.latency)(weeks)).await;
            if self.fail_forecast {
                return Err(crate::api::error::ApiError::Http {
                    status: 503,
                    body: "unavailable".to_string(),
                }
                .into());
            }
            Ok(flat_forecast(weeks))
        }

        async fn list_scenarios(&self, _user_id: &str) -> anyhow::Result<Vec<Scenario>> {
            Ok(Vec::new())
        }

        async fn create_scenario(
            &self,
            _user_id: &str,
            _input: &NewScenario,
        ) -> anyhow::Result<Scenario> {
            anyhow::bail!("not stubbed")
        }

        async fn update_scenario(&self, _scenario: &Scenario) -> anyhow::Result<Scenario> {
            anyhow::bail!("not stubbed")
        }

        async fn delete_scenario(&self, _scenario_id: &str) -> anyhow::Result<()> {
            anyhow::bail!("not stubbed")
        }

        async fn fetch_scenario_comparison(
            &self,
            scenario_id: &str,
            weeks: u32,
        ) -> anyhow::Result<ScenarioComparison> {
            tokio::time::sleep((self.latency)(weeks)).await;
            let base = flat_forecast(weeks);
            Ok(ScenarioComparison {
                scenario_id: scenario_id.to_string(),
                weeks: base
                    .weeks
                    .iter()
                    .map(|w| ComparisonWeek {
                        week_number: w.week_number,
                        week_start: w.week_start,
                        base_balance: w.ending_balance,
                        scenario_balance: w.ending_balance - 500.0 * f64::from(w.week_number),
                    })
                    .collect(),
                runway_change_weeks: None,
            })
        }

        async fn fetch_scenario_suggestions(
            &self,
            _user_id: &str,
        ) -> anyhow::Result<Vec<ScenarioSuggestion>> {
            Ok(Vec::new())
        }

        async fn list_actions(&self, _user_id: &str) -> anyhow::Result<Vec<ActionItem>> {
            Ok(Vec::new())
        }

        async fn approve_action(&self, _action_id: &str) -> anyhow::Result<ActionItem> {
            anyhow::bail!("not stubbed")
        }

        async fn skip_action(&self, _action_id: &str) -> anyhow::Result<ActionItem> {
            anyhow::bail!("not stubbed")
        }

        async fn override_action(
            &self,
            _action_id: &str,
            _note: &str,
        ) -> anyhow::Result<ActionItem> {
            anyhow::bail!("not stubbed")
        }

        async fn fetch_risks(&self, _user_id: &str) -> anyhow::Result<Vec<Risk>> {
            Ok(Vec::new())
        }

        async fn fetch_controls(&self, _user_id: &str) -> anyhow::Result<Vec<Control>> {
            Ok(Vec::new())
        }

        async fn stream_chat(
            &self,
            _request: &ChatRequest,
            _on_event: &mut (dyn for<'e> FnMut(&'e ChatEvent) + Send),
        ) -> anyhow::Result<ChatOutcome> {
            anyhow::bail!("not stubbed")
        }
    }
}
