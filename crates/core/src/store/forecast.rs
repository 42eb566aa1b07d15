use crate::api::error::{notice_for, Notice};
use crate::api::TamioApi;
use crate::domain::forecast::{
    all_visible, derive_category_filters, roll_up_monthly, visible_series, CategoryFilter,
    CategoryKind, ChartPoint, Forecast, Granularity, OverlayPoint, TimeRange, ViewMode,
};
use crate::domain::scenario::{Scenario, ScenarioComparison, ScenarioOverlay};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastViewState {
    pub time_range: TimeRange,
    pub granularity: Granularity,
    pub view_mode: ViewMode,
    pub forecast: Option<Forecast>,
    pub is_loading: bool,
    pub error: Option<Notice>,
    pub categories: Vec<CategoryFilter>,
    pub scenarios: ScenarioOverlay,
}

impl Default for ForecastViewState {
    fn default() -> Self {
        Self {
            time_range: TimeRange::Weeks13,
            granularity: Granularity::Weekly,
            view_mode: ViewMode::Chart,
            forecast: None,
            is_loading: false,
            error: None,
            categories: Vec::new(),
            scenarios: ScenarioOverlay::default(),
        }
    }
}

/// Forecast view state shared by the chart and table: time range, category
/// visibility and up to five scenario overlays. Remote fetches are tagged
/// with a generation; a response whose generation has been superseded is
/// dropped instead of overwriting newer state.
pub struct UnifiedForecastStore {
    user_id: String,
    api: Arc<dyn TamioApi>,
    state: watch::Sender<ForecastViewState>,
    forecast_generation: AtomicU64,
    overlay_generation: AtomicU64,
}

impl UnifiedForecastStore {
    pub fn new(user_id: &str, api: Arc<dyn TamioApi>) -> Self {
        Self {
            user_id: user_id.to_string(),
            api,
            state: watch::channel(ForecastViewState::default()).0,
            forecast_generation: AtomicU64::new(0),
            overlay_generation: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> ForecastViewState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ForecastViewState> {
        self.state.subscribe()
    }

    pub async fn refresh_forecast(&self) -> anyhow::Result<()> {
        let generation = self.forecast_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weeks = self.state.borrow().time_range.weeks();
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let result = self.api.fetch_forecast(&self.user_id, weeks).await;
        if self.forecast_generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(generation, weeks, "discarding superseded forecast response");
            return Ok(());
        }

        match result {
            Ok(forecast) => {
                self.state.send_modify(|s| {
                    s.categories = derive_category_filters(&forecast, &s.categories);
                    s.forecast = Some(forecast);
                    s.is_loading = false;
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %self.user_id,
                    weeks,
                    error = %err,
                    "forecast fetch failed"
                );
                let notice = notice_for(&err);
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(notice);
                });
                Err(err)
            }
        }
    }

    /// Switching the range refetches the forecast and every applied
    /// comparison for the new horizon. Comparisons still in flight for the
    /// old horizon are discarded, and an overlay whose refetch fails is
    /// dropped rather than shown against the wrong weeks.
    pub async fn set_time_range(&self, range: TimeRange) -> anyhow::Result<bool> {
        let mut previous = Vec::new();
        let changed = self.state.send_if_modified(|s| {
            if s.time_range == range {
                return false;
            }
            s.time_range = range;
            previous = s
                .scenarios
                .applied()
                .iter()
                .map(|a| (a.id.clone(), a.name.clone()))
                .collect();
            s.scenarios.clear();
            self.overlay_generation.fetch_add(1, Ordering::SeqCst);
            true
        });
        if !changed {
            return Ok(false);
        }

        let refreshed = self.refresh_forecast().await;
        for (id, name) in &previous {
            if let Err(err) = self.fetch_and_apply(id, name).await {
                tracing::warn!(
                    scenario_id = %id,
                    error = %err,
                    "dropping overlay after range change"
                );
            }
        }
        refreshed?;
        Ok(true)
    }

    pub fn set_granularity(&self, granularity: Granularity) -> bool {
        self.state.send_if_modified(|s| {
            if s.granularity == granularity {
                return false;
            }
            s.granularity = granularity;
            true
        })
    }

    pub fn set_view_mode(&self, view_mode: ViewMode) -> bool {
        self.state.send_if_modified(|s| {
            if s.view_mode == view_mode {
                return false;
            }
            s.view_mode = view_mode;
            true
        })
    }

    pub fn toggle_category(&self, id: &str) -> bool {
        self.state.send_if_modified(|s| {
            let Some(filter) = s.categories.iter_mut().find(|f| f.id == id) else {
                return false;
            };
            filter.visible = !filter.visible;
            true
        })
    }

    pub fn toggle_all_categories(&self, kind: CategoryKind, visible: bool) -> bool {
        self.state.send_if_modified(|s| {
            let mut changed = false;
            for filter in s.categories.iter_mut().filter(|f| f.kind == kind) {
                changed |= filter.visible != visible;
                filter.visible = visible;
            }
            changed
        })
    }

    pub fn all_income_visible(&self) -> bool {
        all_visible(&self.state.borrow().categories, CategoryKind::Income)
    }

    pub fn all_costs_visible(&self) -> bool {
        all_visible(&self.state.borrow().categories, CategoryKind::Cost)
    }

    /// Applies a scenario whose comparison is already known. Ignored when the
    /// id is applied or five scenarios are showing.
    pub fn apply_scenario(&self, id: &str, name: &str, comparison: ScenarioComparison) -> bool {
        let applied = self
            .state
            .send_if_modified(|s| s.scenarios.apply(id, name, comparison));
        if !applied {
            tracing::debug!(scenario_id = id, "scenario overlay unchanged");
        }
        applied
    }

    /// Fetches the comparison for `scenario` at the current horizon and
    /// applies it. No request is made when the overlay would ignore it.
    pub async fn apply_scenario_from_api(&self, scenario: &Scenario) -> anyhow::Result<bool> {
        self.fetch_and_apply(&scenario.id, &scenario.name).await
    }

    async fn fetch_and_apply(&self, id: &str, name: &str) -> anyhow::Result<bool> {
        let generation = self.overlay_generation.load(Ordering::SeqCst);
        let weeks = {
            let state = self.state.borrow();
            if state.scenarios.contains(id) || state.scenarios.is_full() {
                return Ok(false);
            }
            state.time_range.weeks()
        };

        let comparison = match self.api.fetch_scenario_comparison(id, weeks).await {
            Ok(comparison) => comparison,
            Err(err) => {
                tracing::warn!(scenario_id = %id, error = %err, "scenario comparison fetch failed");
                let notice = notice_for(&err);
                self.state.send_modify(|s| s.error = Some(notice));
                return Err(err);
            }
        };

        if self.overlay_generation.load(Ordering::SeqCst) != generation
            || self.state.borrow().time_range.weeks() != weeks
        {
            tracing::debug!(scenario_id = %id, weeks, "discarding superseded comparison");
            return Ok(false);
        }
        Ok(self.apply_scenario(id, name, comparison))
    }

    pub fn remove_scenario(&self, id: &str) -> bool {
        self.state.send_if_modified(|s| s.scenarios.remove(id))
    }

    pub fn clear_all_scenarios(&self) -> bool {
        self.overlay_generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_if_modified(|s| s.scenarios.clear())
    }

    /// Series for the chart at the current granularity, restricted to visible
    /// categories, with each applied scenario's balance attached by week.
    pub fn chart_points(&self) -> Vec<ChartPoint> {
        let state = self.state.borrow();
        let Some(forecast) = &state.forecast else {
            return Vec::new();
        };

        let mut points = visible_series(forecast, &state.categories);
        for point in &mut points {
            point.overlays = state
                .scenarios
                .applied()
                .iter()
                .filter_map(|applied| {
                    applied
                        .comparison
                        .weeks
                        .iter()
                        .find(|w| w.week_number == point.week_number)
                        .map(|w| OverlayPoint {
                            scenario_id: applied.id.clone(),
                            color: applied.color,
                            balance: w.scenario_balance,
                        })
                })
                .collect();
        }

        match state.granularity {
            Granularity::Weekly => points,
            Granularity::Monthly => roll_up_monthly(points),
        }
    }
}
