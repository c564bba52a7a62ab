// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator/worker message bus.
//!
//! An append-only log with read cursors: no push, no delivery state. A
//! receiver passes the last cursor it saw and gets everything newer; dedupe
//! is the consumer's job, keyed on message id.

use pal_core::{
    conversation_id, Clock, Error, Message, MessageSubtype, MessageType, PortId, Result, SessionId,
};
use pal_storage::queries::messages;
use pal_storage::Store;

/// Everything needed to append one message.
#[derive(Debug, Clone)]
pub struct SendSpec {
    pub from_session: SessionId,
    pub to_session: SessionId,
    pub message_type: MessageType,
    pub subtype: MessageSubtype,
    pub port_id: Option<PortId>,
    pub payload: serde_json::Value,
    pub token_count: Option<i64>,
    /// Explicit conversation id; derived from `(from, to, port)` when absent.
    pub conversation_id: Option<String>,
}

impl SendSpec {
    pub fn report(
        from: &SessionId,
        to: &SessionId,
        subtype: MessageSubtype,
        port_id: Option<&PortId>,
    ) -> Self {
        Self {
            from_session: from.clone(),
            to_session: to.clone(),
            message_type: MessageType::Report,
            subtype,
            port_id: port_id.cloned(),
            payload: serde_json::json!({}),
            token_count: None,
            conversation_id: None,
        }
    }

    pub fn request(
        from: &SessionId,
        to: &SessionId,
        subtype: MessageSubtype,
        port_id: Option<&PortId>,
    ) -> Self {
        Self {
            message_type: MessageType::Request,
            ..Self::report(from, to, subtype, port_id)
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

pub struct MessageBus<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> MessageBus<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Durably append a message; returns its id.
    pub fn send(&self, spec: &SendSpec) -> Result<i64> {
        let now = self.clock.now();
        let conversation = spec.conversation_id.clone().unwrap_or_else(|| {
            conversation_id(&spec.from_session, &spec.to_session, spec.port_id.as_ref())
        });
        self.store.with_tx(|tx| {
            let id = messages::insert(
                tx,
                &conversation,
                spec.from_session.as_str(),
                spec.to_session.as_str(),
                spec.message_type,
                &spec.subtype,
                spec.port_id.as_ref().map(|p| p.as_str()),
                &spec.payload,
                spec.token_count,
                &now,
            )?;
            tracing::debug!(
                message = id,
                from = %spec.from_session,
                to = %spec.to_session,
                subtype = %spec.subtype,
                "message sent"
            );
            Ok(id)
        })
    }

    /// Messages for `to_session` past `since_cursor`, oldest first, plus the
    /// new cursor. At-least-once: re-reads with a stale cursor repeat
    /// messages, so consumers dedupe on id.
    pub fn receive(
        &self,
        to_session: &SessionId,
        since_cursor: i64,
    ) -> Result<(Vec<Message>, i64)> {
        self.store.with_conn(|conn| {
            let batch = messages::list_to_after(conn, to_session.as_str(), since_cursor, 500)?;
            let cursor = batch.last().map(|m| m.id).unwrap_or(since_cursor);
            Ok((batch, cursor))
        })
    }

    pub fn get(&self, id: i64) -> Result<Message> {
        self.store.with_conn(|conn| {
            messages::get(conn, id)?.ok_or_else(|| Error::not_found("message", id.to_string()))
        })
    }

    pub fn conversation(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.store
            .with_conn(|conn| Ok(messages::list_conversation(conn, conversation_id)?))
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
