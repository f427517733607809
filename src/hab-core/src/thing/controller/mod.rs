// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Thing controller components.
//!
//! Status tracking, event emission, command validation and polling policy
//! used by the generic thing task.

pub mod events;
pub mod handlers;
pub mod machine;
pub mod policies;

pub use events::{ListenerId, ThingEventEmitter, ThingListener};
pub use handlers::{validate_command, ValidationResult};
pub use machine::{
    ConnectionTracker, StatusDetail, StatusEvent, StatusInfo, StatusTransition, ThingStatus,
};
pub use policies::{polling_for, FixedPolling, NoPolling, PollingPolicy};
