// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Service call requests.

use serde_json::{Map, Value};

/// A single service call against the automation server.
///
/// Serialized as `POST /api/services/{domain}/{service}` with a JSON body
/// containing `entity_id` plus any extra fields. Constructed per call and
/// not retained.
///
/// # Examples
///
/// ```
/// use hass_sync_lib::types::ServiceCallRequest;
///
/// let call = ServiceCallRequest::new("light", "turn_on", "light.kitchen")
///     .with_field("brightness", 128);
///
/// assert_eq!(call.path(), "/api/services/light/turn_on");
/// assert_eq!(
///     call.body(),
///     serde_json::json!({"entity_id": "light.kitchen", "brightness": 128})
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCallRequest {
    domain: String,
    service: String,
    entity_id: String,
    extra_fields: Option<Map<String, Value>>,
}

impl ServiceCallRequest {
    /// Creates a service call with `entity_id` as the only payload field.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            entity_id: entity_id.into(),
            extra_fields: None,
        }
    }

    /// `switch.turn_on` / `switch.turn_off` for the given entity.
    #[must_use]
    pub fn switch(entity_id: impl Into<String>, on: bool) -> Self {
        Self::new("switch", if on { "turn_on" } else { "turn_off" }, entity_id)
    }

    /// `scene.turn_on` for the given scene.
    #[must_use]
    pub fn scene(entity_id: impl Into<String>) -> Self {
        Self::new("scene", "turn_on", entity_id)
    }

    /// Adds an extra payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_fields
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Returns the service domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns the service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the target entity id.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> String {
        format!(
            "/api/services/{}/{}",
            urlencoding::encode(&self.domain),
            urlencoding::encode(&self.service)
        )
    }

    /// Builds the JSON body. `entity_id` cannot be overridden by extra fields.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = self.extra_fields.clone().unwrap_or_default();
        body.insert("entity_id".to_string(), Value::from(self.entity_id.as_str()));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn switch_services() {
        let on = ServiceCallRequest::switch("switch.pump", true);
        assert_eq!(on.path(), "/api/services/switch/turn_on");
        assert_eq!(on.body(), json!({"entity_id": "switch.pump"}));

        let off = ServiceCallRequest::switch("switch.pump", false);
        assert_eq!(off.service(), "turn_off");
    }

    #[test]
    fn scene_service() {
        let call = ServiceCallRequest::scene("scene.evening");
        assert_eq!(call.path(), "/api/services/scene/turn_on");
        assert_eq!(call.entity_id(), "scene.evening");
    }

    #[test]
    fn extra_fields_cannot_override_entity_id() {
        let call = ServiceCallRequest::switch("switch.pump", true).with_field("entity_id", "other");
        assert_eq!(call.body()["entity_id"], "switch.pump");
    }
}
