// Copyright (C) 2022-2024 Webb Technologies Inc.
//
// Tangle is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Tangle is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should receive a copy of the GNU General Public License
// If not, see <http://www.gnu.org/licenses/>.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Where the indexer starts on boot.
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Resume one block before the last checkpoint.
    #[default]
    #[display(fmt = "sync")]
    Sync,
    /// Start over from the genesis or activation height.
    #[display(fmt = "resync")]
    Resync,
}

/// What the indexer does once started.
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum WatchMode {
    /// Backfill history, then stop.
    #[display(fmt = "filter")]
    Filter,
    /// Skip history, only follow new events.
    #[display(fmt = "subscribe")]
    Subscribe,
    /// Backfill history, then follow new events.
    #[default]
    #[display(fmt = "filter-and-subscribe")]
    FilterAndSubscribe,
}

impl WatchMode {
    pub fn backfills(&self) -> bool {
        !matches!(self, Self::Subscribe)
    }

    pub fn subscribes(&self) -> bool {
        !matches!(self, Self::Filter)
    }
}
