// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last-known state of each configured switch.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::parser::EntityStates;
use crate::types::SwitchState;

/// Read-only view of one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchSnapshot {
    /// Entity id.
    pub entity_id: String,
    /// Last state read back from the server.
    pub state: SwitchState,
    /// Cycles in a row that failed to read this switch.
    pub consecutive_failures: u32,
    /// Whether commands to this switch are refused.
    pub disabled: bool,
    /// When the switch was last read back.
    pub last_synced: Option<DateTime<Utc>>,
}

/// Tracks every configured switch across sync cycles.
///
/// A switch that is not matched in a cycle keeps its last-known state (off
/// until first read). With auto-disable configured, a switch that misses
/// that many cycles in a row is disabled until re-enabled explicitly.
#[derive(Debug)]
pub struct SwitchBank {
    switches: RwLock<Vec<SwitchSnapshot>>,
    auto_disable_after: Option<u32>,
}

impl SwitchBank {
    /// Creates a bank for `entity_ids`, in order.
    #[must_use]
    pub fn new<I, S>(entity_ids: I, auto_disable_after: Option<u32>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let switches = entity_ids
            .into_iter()
            .map(|id| SwitchSnapshot {
                entity_id: id.into(),
                state: SwitchState::Unknown,
                consecutive_failures: 0,
                disabled: false,
                last_synced: None,
            })
            .collect();
        Self {
            switches: RwLock::new(switches),
            auto_disable_after,
        }
    }

    /// Folds one cycle's results in and returns the on/off state of every switch.
    ///
    /// `states` slots are matched to switches by position.
    pub fn apply(&self, states: &EntityStates) -> Vec<bool> {
        let mut switches = self.switches.write();
        for (index, switch) in switches.iter_mut().enumerate() {
            match states.get(index).filter(|s| s.is_found()) {
                Some(state) => {
                    switch.state = state.switch_state();
                    switch.last_synced = state.last_updated();
                    switch.consecutive_failures = 0;
                }
                None => {
                    switch.consecutive_failures = switch.consecutive_failures.saturating_add(1);
                    if let Some(limit) = self.auto_disable_after
                        && !switch.disabled
                        && switch.consecutive_failures >= limit
                    {
                        switch.disabled = true;
                        tracing::warn!(
                            entity_id = %switch.entity_id,
                            failures = switch.consecutive_failures,
                            "Switch disabled after repeated sync failures"
                        );
                    }
                }
            }
        }
        switches.iter().map(|s| s.state.is_on()).collect()
    }

    /// Returns the on/off state of every switch, in configured order.
    #[must_use]
    pub fn switch_states(&self) -> Vec<bool> {
        self.switches.read().iter().map(|s| s.state.is_on()).collect()
    }

    /// Returns true if `entity_id` is a configured switch.
    #[must_use]
    pub fn contains(&self, entity_id: &str) -> bool {
        self.switches.read().iter().any(|s| s.entity_id == entity_id)
    }

    /// Returns whether the switch is disabled, or `None` if unknown.
    #[must_use]
    pub fn is_disabled(&self, entity_id: &str) -> Option<bool> {
        self.snapshot(entity_id).map(|s| s.disabled)
    }

    /// Enables or disables a switch. Enabling resets its failure counter.
    ///
    /// Returns `false` if the switch is not configured.
    pub fn set_enabled(&self, entity_id: &str, enabled: bool) -> bool {
        let mut switches = self.switches.write();
        let Some(switch) = switches.iter_mut().find(|s| s.entity_id == entity_id) else {
            return false;
        };
        switch.disabled = !enabled;
        if enabled {
            switch.consecutive_failures = 0;
        }
        tracing::info!(entity_id = %entity_id, enabled, "Switch enablement changed");
        true
    }

    /// Returns a snapshot of one switch.
    #[must_use]
    pub fn snapshot(&self, entity_id: &str) -> Option<SwitchSnapshot> {
        self.switches
            .read()
            .iter()
            .find(|s| s.entity_id == entity_id)
            .cloned()
    }

    /// Returns snapshots of all switches, in configured order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SwitchSnapshot> {
        self.switches.read().clone()
    }

    /// Returns the number of switches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.switches.read().len()
    }

    /// Returns true if no switches are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityState;

    fn states(slots: &[Option<(&str, &str)>]) -> EntityStates {
        let mut states = EntityStates::empty(slots.len());
        for (i, slot) in slots.iter().enumerate() {
            if let Some((id, state)) = slot {
                states.set(i, EntityState::new(id, state, ""));
            }
        }
        states
    }

    #[test]
    fn unmatched_switch_keeps_last_known_state() {
        let bank = SwitchBank::new(["switch.a", "switch.b", "switch.c"], None);

        let first = bank.apply(&states(&[
            Some(("switch.a", "on")),
            Some(("switch.b", "off")),
            Some(("switch.c", "on")),
        ]));
        assert_eq!(first, vec![true, false, true]);

        let second = bank.apply(&states(&[
            Some(("switch.a", "off")),
            Some(("switch.b", "on")),
            None,
        ]));
        assert_eq!(second, vec![false, true, true]);
        assert_eq!(bank.snapshot("switch.c").unwrap().consecutive_failures, 1);
    }

    #[test]
    fn never_read_switch_reports_off() {
        let bank = SwitchBank::new(["switch.a"], None);
        assert_eq!(bank.switch_states(), vec![false]);
        assert_eq!(bank.snapshot("switch.a").unwrap().state, SwitchState::Unknown);
    }

    #[test]
    fn auto_disable_after_limit() {
        let bank = SwitchBank::new(["switch.a"], Some(3));
        let missing = states(&[None]);

        bank.apply(&missing);
        bank.apply(&missing);
        assert_eq!(bank.is_disabled("switch.a"), Some(false));
        bank.apply(&missing);
        assert_eq!(bank.is_disabled("switch.a"), Some(true));

        assert!(bank.set_enabled("switch.a", true));
        let snapshot = bank.snapshot("switch.a").unwrap();
        assert!(!snapshot.disabled);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn without_policy_switch_is_never_disabled() {
        let bank = SwitchBank::new(["switch.a"], None);
        for _ in 0..10 {
            bank.apply(&states(&[None]));
        }
        assert_eq!(bank.is_disabled("switch.a"), Some(false));
        assert!(!bank.set_enabled("switch.missing", true));
    }
}
