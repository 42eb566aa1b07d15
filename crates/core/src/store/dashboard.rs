use crate::domain::contract::{dashboard_key, parse_dashboard, StoredDashboard};
use crate::domain::dashboard::{DashboardState, WidgetInstance};
use crate::domain::widget::{self, Preset, WidgetDefinition, WidgetSettings};
use crate::storage::debounce::DebouncedWriter;
use crate::storage::{read_or_log, KeyValueStore};
use crate::store::schedule_json;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_PRESET: Preset = Preset::Leader;

/// A widget instance paired with the registry entry that renders it.
#[derive(Debug, Clone)]
pub struct DashboardCard {
    pub instance: WidgetInstance,
    pub definition: &'static WidgetDefinition,
}

#[derive(Debug)]
pub struct DashboardStore {
    user_id: String,
    state: watch::Sender<DashboardState>,
    writer: Option<DebouncedWriter>,
}

impl DashboardStore {
    pub fn in_memory(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: watch::channel(DashboardState::from_preset(DEFAULT_PRESET, Utc::now())).0,
            writer: None,
        }
    }

    /// Restores the persisted layout for `user_id`. Missing or outdated data
    /// yields the default preset. If storage cannot be read, the store keeps
    /// the default in memory for the session so the stored layout survives.
    pub async fn load(user_id: &str, storage: Arc<dyn KeyValueStore>, delay: Duration) -> Self {
        let key = dashboard_key(user_id);
        let stored = match read_or_log(storage.as_ref(), &key).await {
            Ok(stored) => stored,
            Err(_) => return Self::in_memory(user_id),
        };
        let state = match stored.map(|text| parse_dashboard(&text)) {
            Some(Ok(state)) => state,
            Some(Err(err)) => {
                tracing::info!(%key, error = %err, "discarding stored dashboard; using default");
                DashboardState::from_preset(DEFAULT_PRESET, Utc::now())
            }
            None => DashboardState::from_preset(DEFAULT_PRESET, Utc::now()),
        };

        Self {
            user_id: user_id.to_string(),
            state: watch::channel(state).0,
            writer: Some(DebouncedWriter::spawn(storage, key, delay)),
        }
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state.subscribe()
    }

    /// Returns the new instance id, or `None` when the widget id is not in
    /// the registry.
    pub fn add_widget(&self, widget_id: &str) -> Option<String> {
        if widget::lookup(widget_id).is_none() {
            tracing::debug!(widget_id, "ignoring unknown widget id");
            return None;
        }
        let mut added = None;
        self.commit(|state| {
            added = Some(state.add_widget(widget_id, Utc::now()));
            true
        });
        added
    }

    pub fn remove_widget(&self, instance_id: &str) -> bool {
        self.commit(|state| state.remove_widget(instance_id, Utc::now()))
    }

    pub fn reorder_widgets(&self, from: usize, to: usize) -> bool {
        self.commit(|state| state.reorder_widgets(from, to, Utc::now()))
    }

    pub fn reset_to_preset(&self, preset: Preset) -> bool {
        self.commit(|state| state.reset_to_preset(preset, Utc::now()))
    }

    pub fn update_widget_settings(&self, instance_id: &str, patch: WidgetSettings) -> bool {
        self.commit(|state| state.update_widget_settings(instance_id, patch, Utc::now()))
    }

    pub fn visible_cards(&self) -> Vec<DashboardCard> {
        self.state
            .borrow()
            .widgets
            .iter()
            .filter_map(|instance| {
                widget::resolve_card(&instance.widget_id).map(|definition| DashboardCard {
                    instance: instance.clone(),
                    definition,
                })
            })
            .collect()
    }

    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    fn commit(&self, mutate: impl FnOnce(&mut DashboardState) -> bool) -> bool {
        let changed = self.state.send_if_modified(mutate);
        if changed {
            let stored = StoredDashboard::from(&*self.state.borrow());
            tracing::debug!(
                user_id = %self.user_id,
                widgets = stored.widgets.len(),
                "dashboard updated"
            );
            schedule_json(self.writer.as_ref(), &stored);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{BrokenKvStore, CountingKvStore, UnreadableKvStore};
    use crate::storage::MemoryKvStore;
    use serde_json::json;

    const DELAY: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn starts_on_leader_preset() {
        let store = DashboardStore::in_memory("u1");
        let state = store.snapshot();
        assert_eq!(state.active_preset, Preset::Leader);
        assert_eq!(
            state.widget_ids(),
            vec!["cash_runway", "health_status", "next_big_obligation"]
        );
        assert!(!state.dirty);
    }

    #[tokio::test]
    async fn unknown_widget_is_not_added() {
        let store = DashboardStore::in_memory("u1");
        let rx = store.subscribe();
        assert_eq!(store.add_widget("does_not_exist"), None);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.snapshot().widgets.len(), 3);
    }

    #[tokio::test]
    async fn subscribers_only_see_committed_changes() {
        let store = DashboardStore::in_memory("u1");
        let mut rx = store.subscribe();

        assert!(!store.reorder_widgets(0, 9));
        assert!(!store.remove_widget("missing"));
        assert!(!store.reset_to_preset(Preset::Custom));
        assert!(!rx.has_changed().unwrap());

        assert!(store.reorder_widgets(0, 2));
        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert_eq!(seen.active_preset, Preset::Custom);
        assert!(seen.dirty);
        assert_eq!(
            seen.widget_ids(),
            vec!["health_status", "next_big_obligation", "cash_runway"]
        );
    }

    #[tokio::test]
    async fn settings_update_keeps_preset() {
        let store = DashboardStore::in_memory("u1");
        let instance_id = store.snapshot().widgets[0].instance_id.clone();
        let mut patch = WidgetSettings::new();
        patch.insert("compact".to_string(), json!(true));

        assert!(store.update_widget_settings(&instance_id, patch));
        let state = store.snapshot();
        assert_eq!(state.active_preset, Preset::Leader);
        assert!(state.dirty);
        assert_eq!(state.widgets[0].settings.get("compact"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn visible_cards_skip_unrendered_widgets() {
        let store = DashboardStore::in_memory("u1");
        store.add_widget("upcoming_payroll");
        store.add_widget("alerts_feed");
        let ids: Vec<_> = store
            .visible_cards()
            .iter()
            .map(|c| c.definition.id)
            .collect();
        assert_eq!(
            ids,
            vec!["cash_runway", "health_status", "next_big_obligation", "alerts_feed"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn layout_survives_reload() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let store = DashboardStore::load("u1", Arc::clone(&storage), DELAY).await;
        store.reset_to_preset(Preset::FinanceManager);
        store.add_widget("cash_forecast_chart");
        store.flush().await;

        let before = store.snapshot();
        let reloaded = DashboardStore::load("u1", storage, DELAY).await;
        let after = reloaded.snapshot();
        assert_eq!(after.widgets, before.widgets);
        assert_eq!(after.active_preset, Preset::Custom);
        assert!(after.dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_write() {
        let storage = Arc::new(CountingKvStore::default());
        let store = DashboardStore::load("u1", storage.clone(), DELAY).await;
        store.reorder_widgets(0, 1);
        store.reorder_widgets(1, 2);
        store.reorder_widgets(2, 0);
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(storage.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schema_bump_falls_back_to_default() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryKvStore::new());
        let stale = json!({
            "schemaVersion": 0,
            "widgets": [{"instanceId": "a", "widgetId": "alerts_feed"}],
            "activePreset": "custom",
            "lastModified": "2024-01-15T09:00:00Z",
        });
        storage
            .set(&dashboard_key("u1"), &stale.to_string())
            .await
            .unwrap();

        let store = DashboardStore::load("u1", storage, DELAY).await;
        let state = store.snapshot();
        assert_eq!(state.active_preset, Preset::Leader);
        assert_eq!(state.widgets.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_storage_keeps_working_in_memory() {
        let store = DashboardStore::load("u1", Arc::new(BrokenKvStore), DELAY).await;
        assert!(store.add_widget("alerts_feed").is_some());
        store.flush().await;
        assert_eq!(store.snapshot().widgets.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_storage_leaves_saved_layout_alone() {
        let storage = Arc::new(UnreadableKvStore::default());
        let saved = DashboardStore::in_memory("u1");
        saved.reset_to_preset(Preset::FinanceManager);
        let saved_text = serde_json::to_string(&StoredDashboard::from(&saved.snapshot())).unwrap();
        storage.inner.set(&dashboard_key("u1"), &saved_text).await.unwrap();

        let store = DashboardStore::load("u1", storage.clone(), DELAY).await;
        assert_eq!(store.snapshot().active_preset, Preset::Leader);
        assert!(store.add_widget("alerts_feed").is_some());
        store.flush().await;
        tokio::time::sleep(DELAY * 2).await;

        let kept = storage.inner.get(&dashboard_key("u1")).await.unwrap();
        assert_eq!(kept.as_deref(), Some(saved_text.as_str()));
    }
}
