use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub starting_cash: f64,
    pub weeks: Vec<ForecastWeek>,
    #[serde(default)]
    pub summary: Option<ForecastSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastWeek {
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub starting_balance: f64,
    pub cash_in: f64,
    pub cash_out: f64,
    pub net_change: f64,
    pub ending_balance: f64,
    #[serde(default)]
    pub events: Vec<ForecastEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastEvent {
    pub id: String,
    pub date: NaiveDate,
    pub amount: f64,
    pub direction: CashDirection,
    pub category: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub lowest_cash_week: u32,
    pub lowest_cash_amount: f64,
    pub total_cash_in: f64,
    pub total_cash_out: f64,
    #[serde(default)]
    pub runway_weeks: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    Income,
    Cost,
}

impl CategoryKind {
    pub fn label(self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Cost => "cost",
        }
    }
}

impl From<CashDirection> for CategoryKind {
    fn from(direction: CashDirection) -> Self {
        match direction {
            CashDirection::In => CategoryKind::Income,
            CashDirection::Out => CategoryKind::Cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub id: String,
    pub name: String,
    pub kind: CategoryKind,
    pub visible: bool,
}

impl CategoryFilter {
    pub fn filter_id(kind: CategoryKind, name: &str) -> String {
        format!("{}-{name}", kind.label())
    }
}

/// One filter per distinct (direction, category) in first-seen order. Entries
/// whose id already exists in `previous` keep their visibility; new ones start
/// visible.
pub fn derive_category_filters(
    forecast: &Forecast,
    previous: &[CategoryFilter],
) -> Vec<CategoryFilter> {
    let mut out: Vec<CategoryFilter> = Vec::new();
    for event in forecast.weeks.iter().flat_map(|w| w.events.iter()) {
        let kind = CategoryKind::from(event.direction);
        let id = CategoryFilter::filter_id(kind, &event.category);
        if out.iter().any(|f| f.id == id) {
            continue;
        }
        let visible = previous
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.visible)
            .unwrap_or(true);
        out.push(CategoryFilter {
            id,
            name: event.category.clone(),
            kind,
            visible,
        });
    }
    out
}

/// True only when at least one filter of `kind` exists and all of them are visible.
pub fn all_visible(filters: &[CategoryFilter], kind: CategoryKind) -> bool {
    let mut of_kind = filters.iter().filter(|f| f.kind == kind).peekable();
    of_kind.peek().is_some() && of_kind.all(|f| f.visible)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Weeks13,
    Weeks26,
    Weeks52,
}

impl TimeRange {
    pub fn weeks(self) -> u32 {
        match self {
            TimeRange::Weeks13 => 13,
            TimeRange::Weeks26 => 26,
            TimeRange::Weeks52 => 52,
        }
    }

    pub fn from_weeks(weeks: u32) -> Option<Self> {
        match weeks {
            13 => Some(TimeRange::Weeks13),
            26 => Some(TimeRange::Weeks26),
            52 => Some(TimeRange::Weeks52),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    Chart,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub cash_in: f64,
    pub cash_out: f64,
    pub balance: f64,
    pub overlays: Vec<OverlayPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayPoint {
    pub scenario_id: String,
    pub color: &'static str,
    pub balance: f64,
}

/// Weekly totals restricted to visible categories. Hidden categories are
/// removed from cash in/out and from the running balance.
pub fn visible_series(forecast: &Forecast, filters: &[CategoryFilter]) -> Vec<ChartPoint> {
    let hidden = |event: &ForecastEvent| {
        let id = CategoryFilter::filter_id(event.direction.into(), &event.category);
        filters.iter().any(|f| f.id == id && !f.visible)
    };

    let mut balance = forecast.starting_cash;
    let mut out = Vec::with_capacity(forecast.weeks.len());
    for week in &forecast.weeks {
        let mut cash_in = week.cash_in;
        let mut cash_out = week.cash_out;
        for event in week.events.iter().filter(|e| hidden(*e)) {
            match event.direction {
                CashDirection::In => cash_in -= event.amount,
                CashDirection::Out => cash_out -= event.amount,
            }
        }
        balance += cash_in - cash_out;
        out.push(ChartPoint {
            week_number: week.week_number,
            week_start: week.week_start,
            cash_in,
            cash_out,
            balance,
            overlays: Vec::new(),
        });
    }
    out
}

/// Collapses weekly points into calendar months keyed by each week's start
/// date. Flows are summed; the balance and overlays are the month's last week.
pub fn roll_up_monthly(points: Vec<ChartPoint>) -> Vec<ChartPoint> {
    let mut out: Vec<ChartPoint> = Vec::new();
    for point in points {
        let month = (point.week_start.year(), point.week_start.month());
        match out.last_mut() {
            Some(current) if (current.week_start.year(), current.week_start.month()) == month => {
                current.cash_in += point.cash_in;
                current.cash_out += point.cash_out;
                current.balance = point.balance;
                current.overlays = point.overlays;
            }
            _ => out.push(point),
        }
    }
    out
}
