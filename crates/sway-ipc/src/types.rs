//! Message type codes for the sway IPC protocol
//!
//! Requests and events live in separate code spaces that share the `type`
//! header field. Events pushed on a subscribed connection carry
//! [`EVENT_BIT`] so they can be told apart from request replies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// High-order marker bit set by sway on pushed event frames
pub const EVENT_BIT: u32 = 0x8000_0000;

/// Synchronous command/query message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    RunCommand,
    GetWorkspaces,
    Subscribe,
    GetOutputs,
    GetTree,
    GetMarks,
    GetBarConfig,
    GetVersion,
    GetBindingModes,
    GetConfig,
    SendTick,
    Sync,
    GetBindingState,
    GetInputs,
    GetSeats,
}

impl RequestKind {
    /// All request kinds, in code order
    pub const ALL: [RequestKind; 15] = [
        Self::RunCommand,
        Self::GetWorkspaces,
        Self::Subscribe,
        Self::GetOutputs,
        Self::GetTree,
        Self::GetMarks,
        Self::GetBarConfig,
        Self::GetVersion,
        Self::GetBindingModes,
        Self::GetConfig,
        Self::SendTick,
        Self::Sync,
        Self::GetBindingState,
        Self::GetInputs,
        Self::GetSeats,
    ];

    /// Wire code for this request
    pub const fn code(self) -> u32 {
        match self {
            Self::RunCommand => 0,
            Self::GetWorkspaces => 1,
            Self::Subscribe => 2,
            Self::GetOutputs => 3,
            Self::GetTree => 4,
            Self::GetMarks => 5,
            Self::GetBarConfig => 6,
            Self::GetVersion => 7,
            Self::GetBindingModes => 8,
            Self::GetConfig => 9,
            Self::SendTick => 10,
            Self::Sync => 11,
            Self::GetBindingState => 12,
            Self::GetInputs => 100,
            Self::GetSeats => 101,
        }
    }

    /// Look up a request kind by wire code
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }
}

/// Asynchronously pushed event types
///
/// Codes follow sway's `ipc.h`. The code space is separate from
/// [`RequestKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Workspace,
    Output,
    Mode,
    Window,
    #[serde(rename = "barconfig_update")]
    BarConfigUpdate,
    Binding,
    Shutdown,
    Tick,
    BarStateUpdate,
    Input,
}

impl EventKind {
    /// All event kinds, in code order
    pub const ALL: [EventKind; 10] = [
        Self::Workspace,
        Self::Output,
        Self::Mode,
        Self::Window,
        Self::BarConfigUpdate,
        Self::Binding,
        Self::Shutdown,
        Self::Tick,
        Self::BarStateUpdate,
        Self::Input,
    ];

    /// Wire code for this event, without [`EVENT_BIT`]
    pub const fn code(self) -> u32 {
        match self {
            Self::Workspace => 0,
            Self::Output => 1,
            Self::Mode => 2,
            Self::Window => 3,
            Self::BarConfigUpdate => 4,
            Self::Binding => 5,
            Self::Shutdown => 6,
            Self::Tick => 7,
            Self::BarStateUpdate => 0x14,
            Self::Input => 0x15,
        }
    }

    /// Look up an event kind by wire code
    ///
    /// The marker bit is ignored, so both raw header values and bare codes
    /// are accepted.
    pub fn from_code(code: u32) -> Option<Self> {
        let code = code & !EVENT_BIT;
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Name used in the SUBSCRIBE payload
    pub const fn name(self) -> &'static str {
        match self {
            Self::Workspace => "workspace",
            Self::Output => "output",
            Self::Mode => "mode",
            Self::Window => "window",
            Self::BarConfigUpdate => "barconfig_update",
            Self::Binding => "binding",
            Self::Shutdown => "shutdown",
            Self::Tick => "tick",
            Self::BarStateUpdate => "bar_state_update",
            Self::Input => "input",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lower)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

/// A decoded event pushed on a subscription connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Which kind of event this is
    pub kind: EventKind,
    /// The event body, untouched
    pub payload: serde_json::Value,
}
