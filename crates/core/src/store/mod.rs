//! Observable client-side stores. Each store owns its state behind a
//! `tokio::sync::watch` channel: mutations commit through `send_if_modified`,
//! so subscribers are woken only for real transitions, and a committed change
//! schedules a debounced write when the store is persisted.

pub mod dashboard;
pub mod forecast;
pub mod rules;

use crate::storage::debounce::DebouncedWriter;
use serde::Serialize;

/// Serializes `value` and hands it to the writer. A serialization failure is
/// logged and the change stays in memory.
fn schedule_json<T: Serialize>(writer: Option<&DebouncedWriter>, value: &T) {
    let Some(writer) = writer else {
        return;
    };
    match serde_json::to_string(value) {
        Ok(text) => writer.schedule(text),
        Err(err) => {
            tracing::warn!(
                key = %writer.key(),
                error = %err,
                "failed to serialize store state; change kept in memory only"
            )
        }
    }
}
