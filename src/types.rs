//! Core types for interface impairment requests

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requested interface state as it appears on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterfaceState {
    #[default]
    Unspecified,
    Up,
    AdminDown,
}

impl fmt::Display for InterfaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceState::Unspecified => "UNSPECIFIED",
            InterfaceState::Up => "UP",
            InterfaceState::AdminDown => "ADMIN_DOWN",
        };
        f.write_str(s)
    }
}

/// Administrative state understood by the link collaborator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminState {
    Up,
    Down,
}

impl TryFrom<InterfaceState> for AdminState {
    type Error = InterfaceState;

    fn try_from(state: InterfaceState) -> Result<Self, Self::Error> {
        match state {
            InterfaceState::Up => Ok(AdminState::Up),
            InterfaceState::AdminDown => Ok(AdminState::Down),
            other => Err(other),
        }
    }
}

/// A single impairment request handed to the engine.
///
/// Built per call and dropped once the call returns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImpairmentRequest {
    pub interface_name: String,
    pub desired_state: InterfaceState,
    /// Packet loss percentage, valid range `[0, 100)`
    pub loss_pct: u32,
    /// Additional latency in milliseconds
    pub latency_msec: u32,
}

impl ImpairmentRequest {
    pub fn new(interface_name: impl Into<String>, desired_state: InterfaceState) -> Self {
        Self {
            interface_name: interface_name.into(),
            desired_state,
            loss_pct: 0,
            latency_msec: 0,
        }
    }

    pub fn with_loss(mut self, loss_pct: u32) -> Self {
        self.loss_pct = loss_pct;
        self
    }

    pub fn with_latency(mut self, latency_msec: u32) -> Self {
        self.latency_msec = latency_msec;
        self
    }
}

/// Parameters block of a `SetInterface` call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStateParams {
    #[serde(default)]
    pub state: InterfaceState,
    #[serde(default)]
    pub loss_pct: u32,
    #[serde(default)]
    pub latency_msec: u32,
}

/// Body of a `SetInterface` call.
///
/// Both fields are optional on the wire so that the facade can report a
/// missing field instead of a generic decode failure.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInterfaceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub params: Option<InterfaceStateParams>,
}

/// Reply to a successful `SetInterface` call, echoing what was applied
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInterfaceResponse {
    pub name: String,
    pub params: InterfaceStateParams,
}
