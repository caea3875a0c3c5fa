//! Contracts for the kernel-facing collaborators
//!
//! The engine only ever talks to the kernel through [`KernelControl`]. The
//! production implementation lives in [`crate::netlink`]; tests substitute
//! recording fakes.

use crate::errors::DriverError;
use crate::netem::NetemParameters;
use crate::types::AdminState;
use async_trait::async_trait;

/// `TC_H_ROOT`: attach at the root of the interface's handle hierarchy
pub const TC_H_ROOT: u32 = 0xFFFF_FFFF;

/// Handle `1:0` given to the netem qdisc
pub const NETEM_HANDLE: u32 = 0x0001_0000;

/// Longest interface name the kernel accepts (`IFNAMSIZ` minus the NUL)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Full description of a root qdisc replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QdiscReplace {
    pub if_index: u32,
    pub parent: u32,
    pub handle: u32,
    pub kind: &'static str,
    pub netem: NetemParameters,
}

impl QdiscReplace {
    /// A netem qdisc at the root of `if_index`
    pub fn root_netem(if_index: u32, netem: NetemParameters) -> Self {
        Self {
            if_index,
            parent: TC_H_ROOT,
            handle: NETEM_HANDLE,
            kind: "netem",
            netem,
        }
    }
}

/// Operations the engine needs from the kernel.
///
/// Implementations must be usable from several tasks at once; the engine
/// still serializes [`KernelControl::replace_qdisc`] itself.
#[async_trait]
pub trait KernelControl: Send + Sync {
    /// Whether `name` is acceptable as an interface name on this host
    fn is_valid_name(&self, name: &str) -> bool;

    /// Resolve `name` to its current kernel index.
    ///
    /// Returns [`DriverError::NotFound`] when no such interface exists.
    async fn resolve_index(&self, name: &str) -> Result<u32, DriverError>;

    /// Bring the interface administratively up or down
    async fn set_admin_state(
        &self,
        name: &str,
        if_index: u32,
        state: AdminState,
    ) -> Result<(), DriverError>;

    /// Replace the root qdisc described by `qdisc` in a single kernel request
    async fn replace_qdisc(&self, qdisc: &QdiscReplace) -> Result<(), DriverError>;

    /// Release the underlying kernel channel. Called once, at shutdown.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Syntactic interface name check matching the kernel's `dev_valid_name`
pub fn is_valid_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_INTERFACE_NAME_LEN
        && name != "."
        && name != ".."
        && !name
            .chars()
            .any(|c| c == '/' || c == ':' || c == '\0' || c.is_whitespace())
}
