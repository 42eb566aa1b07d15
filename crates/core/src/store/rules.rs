use crate::domain::contract::{parse_rules, rules_key, StoredRules};
use crate::domain::rule::{filter_rules, NewRule, Rule, RuleFilter, RuleStatus, RuleUpdate};
use crate::storage::debounce::DebouncedWriter;
use crate::storage::{read_or_log, KeyValueStore};
use crate::store::schedule_json;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct RulesStore {
    user_id: String,
    offset: FixedOffset,
    rules: watch::Sender<Vec<Rule>>,
    writer: Option<DebouncedWriter>,
}

impl RulesStore {
    pub fn in_memory(user_id: &str, offset: FixedOffset) -> Self {
        Self {
            user_id: user_id.to_string(),
            offset,
            rules: watch::channel(Vec::new()).0,
            writer: None,
        }
    }

    /// Restores persisted rules. A version mismatch or unreadable payload
    /// discards every stored rule. When storage cannot be read at all the
    /// store runs in memory for the session and never writes back.
    pub async fn load(
        user_id: &str,
        offset: FixedOffset,
        storage: Arc<dyn KeyValueStore>,
        delay: Duration,
    ) -> Self {
        let key = rules_key(user_id);
        let stored = match read_or_log(storage.as_ref(), &key).await {
            Ok(stored) => stored,
            Err(_) => return Self::in_memory(user_id, offset),
        };
        let rules = match stored {
            Some(text) => parse_rules(&text).unwrap_or_else(|err| {
                tracing::info!(%key, error = %err, "discarding stored rules");
                Vec::new()
            }),
            None => Vec::new(),
        };

        Self {
            user_id: user_id.to_string(),
            offset,
            rules: watch::channel(rules).0,
            writer: Some(DebouncedWriter::spawn(storage, key, delay)),
        }
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.rules.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<Rule> {
        self.rules.borrow().iter().find(|r| r.id == id).cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Rule>> {
        self.rules.subscribe()
    }

    pub fn create_rule(&self, input: NewRule) -> anyhow::Result<Rule> {
        let rule = Rule::create(&self.user_id, input, Utc::now())?;
        let created = rule.clone();
        self.commit(|rules| {
            rules.push(rule);
            true
        });
        Ok(created)
    }

    /// `Ok(None)` when no rule has `id`. A rejected update leaves the rule
    /// untouched and notifies no one.
    pub fn update_rule(&self, id: &str, update: &RuleUpdate) -> anyhow::Result<Option<Rule>> {
        let mut outcome: anyhow::Result<Option<Rule>> = Ok(None);
        self.commit(|rules| {
            let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
                return false;
            };
            match rule.apply_update(update, Utc::now()) {
                Ok(()) => {
                    outcome = Ok(Some(rule.clone()));
                    true
                }
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }

    pub fn delete_rule(&self, id: &str) -> bool {
        self.commit(|rules| {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            rules.len() != before
        })
    }

    pub fn duplicate_rule(&self, id: &str) -> Option<Rule> {
        let mut copy = None;
        self.commit(|rules| {
            let Some(original) = rules.iter().find(|r| r.id == id) else {
                return false;
            };
            let duplicate = original.duplicate(Utc::now());
            copy = Some(duplicate.clone());
            rules.push(duplicate);
            true
        });
        copy
    }

    pub fn toggle_rule_status(&self, id: &str) -> Option<RuleStatus> {
        let mut status = None;
        self.commit(|rules| {
            let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
                return false;
            };
            rule.toggle_status(Utc::now());
            status = Some(rule.status);
            true
        });
        status
    }

    pub fn record_trigger(&self, id: &str, at: DateTime<Utc>) -> bool {
        self.commit(|rules| {
            let Some(rule) = rules.iter_mut().find(|r| r.id == id) else {
                return false;
            };
            rule.last_triggered_at = Some(at);
            rule.trigger_count += 1;
            true
        })
    }

    pub fn filtered_rules(&self, filter: RuleFilter) -> Vec<Rule> {
        let today = Utc::now().with_timezone(&self.offset).date_naive();
        self.filtered_rules_on(filter, today)
    }

    pub fn filtered_rules_on(&self, filter: RuleFilter, today: NaiveDate) -> Vec<Rule> {
        let rules = self.rules.borrow();
        filter_rules(&rules, filter, today, self.offset)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    fn commit(&self, mutate: impl FnOnce(&mut Vec<Rule>) -> bool) -> bool {
        let changed = self.rules.send_if_modified(mutate);
        if changed {
            let stored = StoredRules::new(self.rules.borrow().clone(), Utc::now());
            tracing::debug!(user_id = %self.user_id, rules = stored.rules.len(), "rules updated");
            schedule_json(self.writer.as_ref(), &stored);
        }
        changed
    }
}
