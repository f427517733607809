// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::{RequestResult, ThingCommand, ThingSnapshot};

/// Request sent to the thing task.
#[derive(Debug)]
pub struct ThingRequest {
    pub cmd: ThingCommand,
    pub respond_to: oneshot::Sender<RequestResult<ThingSnapshot>>,
}
