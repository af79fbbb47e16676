// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bulk and per-entity state fetches.

use std::sync::Arc;

use crate::error::{Error, ParseError};
use crate::parser::EntityStates;
use crate::sync::SyncContext;
use crate::transport::HttpBackend;

/// Path of the bulk state endpoint.
pub const STATES_PATH: &str = "/api/states";

/// Returns the path of the single-entity state endpoint.
#[must_use]
pub fn entity_state_path(entity_id: &str) -> String {
    format!("{STATES_PATH}/{}", urlencoding::encode(entity_id))
}

impl<B: HttpBackend> SyncContext<B> {
    /// One GET of every server entity, filtered to `entity_ids`.
    pub(crate) async fn fetch_bulk(&self, entity_ids: &Arc<[String]>) -> Result<EntityStates, Error> {
        let body = self.transport.get(STATES_PATH).await?;

        // A blank body is rejected by the parser.
        if let Some(&last) = body.trim_ascii_end().last()
            && last != b']'
        {
            tracing::warn!(bytes = body.len(), "Bulk response does not end with ']', possibly truncated");
        }

        Ok(self.parse(&body, entity_ids).await?)
    }

    /// Parses on the worker when the payload is large, inline otherwise.
    ///
    /// A worker that declines the job (full queue, exhausted pool, stopped)
    /// costs nothing but the inline parse.
    pub(crate) async fn parse(
        &self,
        body: &[u8],
        entity_ids: &Arc<[String]>,
    ) -> Result<EntityStates, ParseError> {
        if body.len() <= self.config.async_parse_threshold() {
            return self.parser.parse_inline(body, entity_ids);
        }

        match self.parser.submit(body, Arc::clone(entity_ids)) {
            Ok(pending) => {
                self.liveness.feed();
                let result = pending
                    .wait(
                        self.config.parse_timeout(),
                        self.liveness.as_ref(),
                        self.config.liveness_interval(),
                    )
                    .await;
                self.liveness.feed();
                result
            }
            Err(
                reason @ (ParseError::QueueFull
                | ParseError::PoolExhausted { .. }
                | ParseError::WorkerUnavailable),
            ) => {
                tracing::debug!(reason = %reason, bytes = body.len(), "Background parse declined, parsing inline");
                self.parser.parse_inline(body, entity_ids)
            }
            Err(e) => Err(e),
        }
    }

    /// One GET per entity, in order, spaced to spare the server.
    ///
    /// Always issues exactly `entity_ids.len()` logical requests.
    pub(crate) async fn fetch_individual(&self, entity_ids: &Arc<[String]>) -> EntityStates {
        let mut states = EntityStates::empty(entity_ids.len());

        for (index, entity_id) in entity_ids.iter().enumerate() {
            self.liveness.feed();
            let succeeded = match self.fetch_one(entity_id).await {
                Ok(Some(state)) => {
                    states.set(index, state);
                    true
                }
                Ok(None) => {
                    tracing::debug!(entity_id = %entity_id, "Entity missing from single-state response");
                    false
                }
                Err(e) => {
                    tracing::debug!(entity_id = %entity_id, error = %e, "Individual fetch failed");
                    false
                }
            };

            if index + 1 < entity_ids.len() {
                let spacing = if succeeded {
                    self.config.request_spacing()
                } else {
                    self.config.failure_spacing()
                };
                self.sleep_feeding(spacing).await;
            }
        }

        tracing::info!(
            matched = states.matched(),
            requested = states.requested(),
            "Individual fetch complete"
        );
        states
    }

    async fn fetch_one(&self, entity_id: &str) -> Result<Option<crate::types::EntityState>, Error> {
        let body = self.transport.get(&entity_state_path(entity_id)).await?;
        let wanted = [entity_id.to_string()];
        let parsed = self.parser.parse_inline(&body, &wanted)?;
        Ok(parsed.into_vec().into_iter().next().filter(|s| s.is_found()))
    }
}
