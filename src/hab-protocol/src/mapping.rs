// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Mapping from client commands to thing commands.

use hab_core::thing::config::REFRESH_KEY;
use hab_core::{ChannelId, Command, ThingCommand};

use crate::types::ClientCommand;

/// Where a client command has to go.
#[derive(Debug, Clone)]
pub enum Route {
    ListThings,
    ListThingTypes,
    Thing { uid: String, cmd: ThingCommand },
}

/// Convert a client command into a route, parsing loose command values.
pub fn client_command_to_route(cmd: ClientCommand) -> Result<Route, String> {
    Ok(match cmd {
        ClientCommand::ListThings => Route::ListThings,
        ClientCommand::ListThingTypes => Route::ListThingTypes,
        ClientCommand::GetThing { thing } => Route::Thing {
            uid: thing,
            cmd: ThingCommand::GetSnapshot,
        },
        ClientCommand::SendCommand {
            thing,
            channel,
            command,
        } => {
            // REFRESH is validated against the channel like any other command.
            let command = Command::from_json(&command)?;
            Route::Thing {
                uid: thing,
                cmd: ThingCommand::SendCommand {
                    channel: ChannelId::from(channel),
                    command,
                },
            }
        }
        ClientCommand::Refresh { thing } => Route::Thing {
            uid: thing,
            cmd: ThingCommand::Refresh,
        },
        ClientCommand::Reconfigure {
            thing,
            params,
            refresh,
        } => {
            let params = match refresh {
                Some(secs) => params.with(REFRESH_KEY, secs),
                None => params,
            };
            Route::Thing {
                uid: thing,
                cmd: ThingCommand::Reconfigure(params),
            }
        }
    })
}
