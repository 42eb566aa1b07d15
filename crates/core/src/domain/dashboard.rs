use crate::domain::widget::{self, Preset, WidgetSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DASHBOARD_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetInstance {
    pub instance_id: String,
    pub widget_id: String,
    #[serde(default)]
    pub settings: WidgetSettings,
}

impl WidgetInstance {
    pub fn new(widget_id: &str) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), widget_id)
    }

    /// Preset slots get stable ids (`{widget_id}-{position}`), so resetting
    /// to the same preset always produces the same instances.
    pub fn preset_slot(widget_id: &str, position: usize) -> Self {
        Self::with_id(format!("{widget_id}-{position}"), widget_id)
    }

    fn with_id(instance_id: String, widget_id: &str) -> Self {
        Self {
            instance_id,
            widget_id: widget_id.to_string(),
            settings: widget::default_settings(widget_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub schema_version: u32,
    pub active_preset: Preset,
    pub widgets: Vec<WidgetInstance>,
    pub dirty: bool,
    pub last_modified: DateTime<Utc>,
}

impl DashboardState {
    pub fn from_preset(preset: Preset, now: DateTime<Utc>) -> Self {
        let mut state = Self {
            schema_version: DASHBOARD_SCHEMA_VERSION,
            active_preset: Preset::Custom,
            widgets: Vec::new(),
            dirty: false,
            last_modified: now,
        };
        state.reset_to_preset(preset, now);
        state
    }

    pub fn widget_ids(&self) -> Vec<&str> {
        self.widgets.iter().map(|w| w.widget_id.as_str()).collect()
    }

    pub fn add_widget(&mut self, widget_id: &str, now: DateTime<Utc>) -> String {
        let instance = WidgetInstance::new(widget_id);
        let instance_id = instance.instance_id.clone();
        self.widgets.push(instance);
        self.mark_custom(now);
        instance_id
    }

    pub fn remove_widget(&mut self, instance_id: &str, now: DateTime<Utc>) -> bool {
        let Some(idx) = self
            .widgets
            .iter()
            .position(|w| w.instance_id == instance_id)
        else {
            return false;
        };
        self.widgets.remove(idx);
        self.mark_custom(now);
        true
    }

    pub fn reorder_widgets(&mut self, from: usize, to: usize, now: DateTime<Utc>) -> bool {
        let len = self.widgets.len();
        if from >= len || to >= len || from == to {
            return false;
        }
        let moved = self.widgets.remove(from);
        self.widgets.insert(to, moved);
        self.mark_custom(now);
        true
    }

    /// Replaces the whole widget list with the preset's canonical sequence.
    /// `Custom` has no sequence, so it leaves the state untouched.
    pub fn reset_to_preset(&mut self, preset: Preset, now: DateTime<Utc>) -> bool {
        let Some(ids) = widget::preset_widget_ids(preset) else {
            return false;
        };
        self.widgets = ids
            .iter()
            .enumerate()
            .map(|(position, id)| WidgetInstance::preset_slot(id, position))
            .collect();
        self.active_preset = preset;
        self.dirty = false;
        self.last_modified = now;
        true
    }

    pub fn update_widget_settings(
        &mut self,
        instance_id: &str,
        patch: WidgetSettings,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(instance) = self
            .widgets
            .iter_mut()
            .find(|w| w.instance_id == instance_id)
        else {
            return false;
        };
        instance.settings.extend(patch);
        self.dirty = true;
        self.last_modified = now;
        true
    }

    fn mark_custom(&mut self, now: DateTime<Utc>) {
        if self.active_preset != Preset::Custom {
            self.active_preset = Preset::Custom;
            self.dirty = true;
        }
        self.last_modified = now;
    }
}
