// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flow session operations for multi-field structured forms.

use echocal_core::EchocalError;
use echocal_core::types::{FieldDescriptor, FlowToken, PendingIntentId};
use rusqlite::params;

use crate::database::Database;
use crate::models::FlowSession;

const FLOW_COLUMNS: &str = "flow_token, pending_intent_id, fields_requested, response_data,
     response_received, expires_at, created_at";

fn parse_err(e: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::other(e.to_string())),
    )
}

fn row_to_flow(row: &rusqlite::Row<'_>) -> Result<FlowSession, rusqlite::Error> {
    let fields: String = row.get(2)?;
    let response: Option<String> = row.get(3)?;
    let received: i64 = row.get(4)?;
    Ok(FlowSession {
        flow_token: FlowToken(row.get(0)?),
        pending_intent_id: PendingIntentId(row.get(1)?),
        fields_requested: serde_json::from_str::<Vec<FieldDescriptor>>(&fields)
            .map_err(parse_err)?,
        response_data: response
            .map(|s| serde_json::from_str::<serde_json::Value>(&s))
            .transpose()
            .map_err(parse_err)?,
        response_received: received != 0,
        expires_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Insert a new flow session.
pub async fn create(db: &Database, flow: &FlowSession) -> Result<(), EchocalError> {
    let fields = serde_json::to_string(&flow.fields_requested)
        .map_err(|e| EchocalError::Storage { source: Box::new(e) })?;
    let flow = flow.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO flow_sessions
                 (flow_token, pending_intent_id, fields_requested, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    flow.flow_token.0,
                    flow.pending_intent_id.0,
                    fields,
                    flow.expires_at,
                    flow.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The live (unanswered, unexpired) flow session for a token, if any.
pub async fn find_live_by_token(
    db: &Database,
    token: &str,
) -> Result<Option<FlowSession>, EchocalError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLOW_COLUMNS} FROM flow_sessions
                 WHERE flow_token = ?1
                   AND response_received = 0
                   AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')"
            ))?;
            match stmt.query_row(params![token], row_to_flow) {
                Ok(flow) => Ok(Some(flow)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record the structured response, at most once and only while live.
///
/// Returns `false` when the session was already answered or has expired.
pub async fn record_response(
    db: &Database,
    token: &str,
    response: &serde_json::Value,
) -> Result<bool, EchocalError> {
    let token = token.to_string();
    let response = response.to_string();
    db.connection()
        .call(move |conn| {
            let updated = conn.execute(
                "UPDATE flow_sessions
                 SET response_data = ?1, response_received = 1
                 WHERE flow_token = ?2
                   AND response_received = 0
                   AND expires_at > strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![response, token],
            )?;
            Ok(updated > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a flow session by token, regardless of status.
pub async fn get(db: &Database, token: &str) -> Result<Option<FlowSession>, EchocalError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FLOW_COLUMNS} FROM flow_sessions WHERE flow_token = ?1"
            ))?;
            match stmt.query_row(params![token], row_to_flow) {
                Ok(flow) => Ok(Some(flow)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
