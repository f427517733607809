// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON line protocol spoken between hosts and the hab server.
//!
//! One JSON object per line in each direction. Requests carry a `cmd` tag
//! and an optional `token`; every request gets exactly one response line.

pub mod auth;
pub mod codec;
pub mod mapping;
pub mod types;

pub use auth::{AuthError, NoAuthValidator, TokenSet, TokenValidator};
pub use codec::{encode_response, parse_envelope};
pub use mapping::{client_command_to_route, Route};
pub use types::{ClientCommand, ClientEnvelope, ClientResponse};
