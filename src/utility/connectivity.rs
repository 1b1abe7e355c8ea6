// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the cbm_poller project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Link state shared by the controller and store clients

use std::fmt;

/// State of one endpoint connection.
///
/// Each client owns its own value; the poller only reads it between sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    /// No session is held.
    #[default]
    Disconnected,
    /// A session is open and the last operation on it succeeded.
    Connected,
    /// A session may still be held but an operation on it failed.
    Faulted,
}

impl Connectivity {
    pub fn is_connected(self) -> bool {
        self == Connectivity::Connected
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Disconnected => f.write_str("disconnected"),
            Connectivity::Connected => f.write_str("connected"),
            Connectivity::Faulted => f.write_str("faulted"),
        }
    }
}

/// Result of a `close()` call. Closing never fails from the caller's point of
/// view; a transport error while releasing is reported here and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// A session was held and has been released.
    Released,
    /// A session was held; releasing it reported an error that was swallowed.
    ReleasedWithError(String),
    /// Nothing was open.
    AlreadyClosed,
}
