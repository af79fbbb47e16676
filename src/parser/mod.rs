// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Entity-state response parser.
//!
//! [`parse_sync`] decodes a `/api/states` (array) or `/api/states/{id}`
//! (single object) response into one [`EntityState`] slot per requested id.
//! Large bulk payloads go through [`ParserWorker`] instead, which runs the
//! same algorithm on a dedicated thread so the caller's runtime is not
//! stalled.
//!
//! # Slot contract
//!
//! The output always has exactly as many slots as ids were requested, in
//! request order. Each slot is either fully populated or the default
//! "not found" record.

mod pool;
mod worker;

pub use pool::{ScratchBuffer, ScratchPool};
pub use worker::{JobOutcome, ParserWorker, PendingParse, SyncJob};

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::error::ParseError;
use crate::types::EntityState;

// ============================================================================
// EntityStates
// ============================================================================

/// Fixed-size set of entity slots produced by one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStates {
    slots: Vec<EntityState>,
}

impl EntityStates {
    /// Creates `count` empty ("not found") slots.
    #[must_use]
    pub fn empty(count: usize) -> Self {
        Self {
            slots: vec![EntityState::default(); count],
        }
    }

    /// Returns the number of populated slots.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.slots.iter().filter(|s| s.is_found()).count()
    }

    /// Returns the number of slots (requested ids).
    #[must_use]
    pub fn requested(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if every slot is populated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.matched() == self.requested()
    }

    /// Returns the slot at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EntityState> {
        self.slots.get(index)
    }

    /// Returns the populated slot for `entity_id`.
    #[must_use]
    pub fn find(&self, entity_id: &str) -> Option<&EntityState> {
        self.slots
            .iter()
            .find(|s| s.is_found() && s.entity_id() == entity_id)
    }

    /// Returns all slots in request order.
    #[must_use]
    pub fn as_slice(&self) -> &[EntityState] {
        &self.slots
    }

    /// Consumes the set, returning the slots.
    #[must_use]
    pub fn into_vec(self) -> Vec<EntityState> {
        self.slots
    }

    /// Fills slot `index`. Out-of-range indices are ignored.
    pub(crate) fn set(&mut self, index: usize, state: EntityState) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = state;
        }
    }
}

// ============================================================================
// ParserStats
// ============================================================================

/// Running parser statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Parses completed, inline and background.
    pub jobs_processed: u64,
    /// Parses that ran on the background worker.
    pub async_jobs: u64,
    /// Requested entities that were found.
    pub entities_found: u64,
    /// Requested entities that were missing.
    pub entities_missing: u64,
    /// Total time spent parsing.
    pub total_parse_time: Duration,
    /// Largest payload seen, in bytes.
    pub largest_response_bytes: usize,
    /// Background submissions declined because the queue was full.
    pub queue_full: u64,
    /// Background parses whose result arrived too late and was discarded.
    pub timeouts: u64,
}

impl ParserStats {
    /// Returns the mean parse time.
    #[must_use]
    pub fn average_parse_time(&self) -> Duration {
        if self.jobs_processed == 0 {
            return Duration::ZERO;
        }
        let jobs = u32::try_from(self.jobs_processed).unwrap_or(u32::MAX);
        self.total_parse_time / jobs
    }

    pub(crate) fn record(
        &mut self,
        bytes: usize,
        elapsed: Duration,
        result: &Result<EntityStates, ParseError>,
        requested: usize,
    ) {
        self.jobs_processed += 1;
        self.total_parse_time += elapsed;
        self.largest_response_bytes = self.largest_response_bytes.max(bytes);
        let found = result.as_ref().map_or(0, EntityStates::matched);
        self.entities_found += found as u64;
        self.entities_missing += requested.saturating_sub(found) as u64;
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Extracts the requested entities from a state response.
///
/// `json` may be a single entity object or an array of them. For each
/// requested id the first entity with an equal `entity_id` is used; its
/// `state` must be a string, and `attributes.friendly_name` is copied when
/// present. `last_updated` is set to the parse time.
///
/// # Errors
///
/// Returns `ParseError::Json` for malformed JSON and
/// `ParseError::UnexpectedFormat` for an empty body or JSON that is neither
/// an object nor an array.
///
/// # Examples
///
/// ```
/// use hass_sync_lib::parser::parse_sync;
///
/// let body = br#"[
///     {"entity_id": "switch.pump", "state": "on", "attributes": {"friendly_name": "Pump"}},
///     {"entity_id": "light.hall", "state": "off", "attributes": {}}
/// ]"#;
/// let ids = vec!["switch.pump".to_string(), "switch.fan".to_string()];
///
/// let states = parse_sync(body, &ids).unwrap();
/// assert_eq!(states.requested(), 2);
/// assert_eq!(states.matched(), 1);
/// assert_eq!(states.get(0).unwrap().friendly_name(), "Pump");
/// assert!(!states.get(1).unwrap().is_found());
/// ```
pub fn parse_sync(json: &[u8], entity_ids: &[String]) -> Result<EntityStates, ParseError> {
    if json.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::UnexpectedFormat("empty response body".to_string()));
    }

    let root: Value = serde_json::from_slice(json)?;
    let entities: Vec<&Value> = match &root {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![&root],
        other => {
            return Err(ParseError::UnexpectedFormat(format!(
                "expected an object or array, got {}",
                json_kind(other)
            )));
        }
    };

    // First occurrence wins.
    let mut index: HashMap<&str, &Value> = HashMap::with_capacity(entity_ids.len());
    for entity in entities {
        if let Some(id) = entity.get("entity_id").and_then(Value::as_str) {
            index.entry(id).or_insert(entity);
        }
    }

    let now = Utc::now();
    let mut states = EntityStates::empty(entity_ids.len());
    for (slot, wanted) in entity_ids.iter().enumerate() {
        let Some(entity) = index.get(wanted.as_str()) else {
            continue;
        };
        let Some(state) = entity.get("state").and_then(Value::as_str) else {
            tracing::debug!(entity_id = %wanted, "Entity has no string state, treating as missing");
            continue;
        };
        let friendly_name = entity
            .get("attributes")
            .and_then(|a| a.get("friendly_name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        states.set(
            slot,
            EntityState::with_timestamp(wanted, state, friendly_name, now),
        );
    }

    Ok(states)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_bulk_array() {
        let body = br#"[
            {"entity_id": "switch.a", "state": "on", "attributes": {"friendly_name": "A"}},
            {"entity_id": "sensor.x", "state": "21.5"},
            {"entity_id": "switch.b", "state": "off", "attributes": {"friendly_name": "B"}},
            {"entity_id": "switch.c", "state": "on"}
        ]"#;

        let states = parse_sync(body, &ids(&["switch.a", "switch.b", "switch.c"])).unwrap();

        assert!(states.is_complete());
        assert_eq!(states.get(0).unwrap().state(), "on");
        assert_eq!(states.get(1).unwrap().friendly_name(), "B");
        assert_eq!(states.get(2).unwrap().friendly_name(), "");
        assert!(states.get(2).unwrap().last_updated().is_some());
    }

    #[test]
    fn parses_single_object() {
        let body = br#"{"entity_id": "switch.a", "state": "off", "attributes": {"friendly_name": "A"}}"#;
        let states = parse_sync(body, &ids(&["switch.a"])).unwrap();
        assert_eq!(states.matched(), 1);
        assert_eq!(states.find("switch.a").unwrap().state(), "off");
    }

    #[test]
    fn output_has_one_slot_per_request() {
        let body = br#"[{"entity_id": "switch.a", "state": "on"}]"#;
        let states = parse_sync(body, &ids(&["switch.a", "switch.b", "switch.c"])).unwrap();

        assert_eq!(states.requested(), 3);
        assert_eq!(states.matched(), 1);
        assert!(states.matched() <= states.requested());
        for missing in &states.as_slice()[1..] {
            assert_eq!(missing, &EntityState::default());
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let body = br#"[
            {"entity_id": "switch.a", "state": "on"},
            {"entity_id": "switch.a", "state": "off"}
        ]"#;
        let states = parse_sync(body, &ids(&["switch.a"])).unwrap();
        assert_eq!(states.get(0).unwrap().state(), "on");
    }

    #[test]
    fn non_string_state_is_missing() {
        let body = br#"[{"entity_id": "switch.a", "state": 1}]"#;
        let states = parse_sync(body, &ids(&["switch.a"])).unwrap();
        assert_eq!(states.matched(), 0);
    }

    #[test]
    fn malformed_json_is_error() {
        let err = parse_sync(b"[{\"entity_id\": ", &ids(&["switch.a"])).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn empty_body_is_error() {
        let err = parse_sync(b"  ", &ids(&["switch.a"])).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedFormat(_)));
    }

    #[test]
    fn scalar_root_is_error() {
        let err = parse_sync(b"42", &ids(&["switch.a"])).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedFormat(msg) if msg.contains("number")));
    }

    #[test]
    fn stats_average() {
        let mut stats = ParserStats::default();
        let ok = Ok(EntityStates::empty(2));
        stats.record(100, Duration::from_millis(4), &ok, 2);
        stats.record(300, Duration::from_millis(8), &ok, 2);

        assert_eq!(stats.jobs_processed, 2);
        assert_eq!(stats.entities_missing, 4);
        assert_eq!(stats.largest_response_bytes, 300);
        assert_eq!(stats.average_parse_time(), Duration::from_millis(6));
    }
}
