// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Line codec for envelopes and responses.

use crate::types::{ClientCommand, ClientEnvelope, ClientResponse};

/// Parse one request line into an envelope.
///
/// A bare command without `token` is accepted as well.
pub fn parse_envelope(input: &str) -> Result<ClientEnvelope, serde_json::Error> {
    let input = input.trim();
    match serde_json::from_str::<ClientEnvelope>(input) {
        Ok(envelope) => Ok(envelope),
        Err(_) => {
            let cmd = serde_json::from_str::<ClientCommand>(input)?;
            Ok(ClientEnvelope { token: None, cmd })
        }
    }
}

/// Encode a response as one newline-terminated line.
pub fn encode_response(response: &ClientResponse) -> String {
    let mut line = serde_json::to_string(response).unwrap_or_else(|e| {
        format!(
            "{{\"success\":false,\"error\":{}}}",
            serde_json::Value::String(format!("failed to encode response: {}", e))
        )
    });
    line.push('\n');
    line
}
