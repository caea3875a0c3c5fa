//! Impairment engine
//!
//! Validates a request, maps it onto netem parameters and programs the
//! interface with a single qdisc replace. Nothing is retried: a failed
//! replace leaves the previous qdisc in place and the caller decides whether
//! to try again.

use crate::driver::{KernelControl, QdiscReplace};
use crate::errors::{DriverError, ImpairError, Result};
use crate::netem::{NetemParameters, TickConverter};
use crate::types::{AdminState, ImpairmentRequest, InterfaceState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Effective settings of a successful apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedImpairment {
    pub name: String,
    pub state: InterfaceState,
    pub loss_pct: u32,
    pub latency_msec: u32,
    /// Kernel encoding that was written
    pub netem: NetemParameters,
}

/// Applies admin state and netem impairments to interfaces
pub struct ImpairmentEngine {
    control: Arc<dyn KernelControl>,
    ticks: Arc<dyn TickConverter>,
    replace_lock: Mutex<()>,
    apply_timeout: Duration,
}

impl ImpairmentEngine {
    /// Deadline for the qdisc replace call
    pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(control: Arc<dyn KernelControl>, ticks: Arc<dyn TickConverter>) -> Self {
        Self {
            control,
            ticks,
            replace_lock: Mutex::new(()),
            apply_timeout: Self::DEFAULT_APPLY_TIMEOUT,
        }
    }

    pub fn with_apply_timeout(mut self, apply_timeout: Duration) -> Self {
        self.apply_timeout = apply_timeout;
        self
    }

    pub fn apply_timeout(&self) -> Duration {
        self.apply_timeout
    }

    /// Apply `request` to its interface.
    ///
    /// Resolves the interface, sets its admin state and replaces its root
    /// qdisc with netem. On success the requested values are echoed back.
    pub async fn apply(&self, request: &ImpairmentRequest) -> Result<AppliedImpairment> {
        let (state, latency_usec) = self.validate(request)?;
        let name = request.interface_name.as_str();

        let if_index = match self.control.resolve_index(name).await {
            Ok(index) => index,
            Err(DriverError::NotFound(_)) => {
                return Err(ImpairError::InvalidArgument(format!(
                    "cannot find interface {}",
                    name
                )))
            }
            Err(e) => {
                return Err(ImpairError::Internal(format!(
                    "cannot resolve interface {}, {}",
                    name, e
                )))
            }
        };

        self.control
            .set_admin_state(name, if_index, state)
            .await
            .map_err(|e| ImpairError::Internal(format!("cannot set interface state, {}", e)))?;

        let netem = NetemParameters::derive(request.loss_pct, latency_usec, self.ticks.as_ref());
        info!(
            "setting device {} latency to {} msec",
            name, request.latency_msec
        );
        info!(
            "setting device {} loss to {}% (val: {})",
            name, request.loss_pct, netem.loss
        );

        self.replace(&QdiscReplace::root_netem(if_index, netem))
            .await?;

        Ok(AppliedImpairment {
            name: request.interface_name.clone(),
            state: request.desired_state,
            loss_pct: request.loss_pct,
            latency_msec: request.latency_msec,
            netem,
        })
    }

    /// Check the request in order; the first failure wins.
    fn validate(&self, request: &ImpairmentRequest) -> Result<(AdminState, u32)> {
        let name = request.interface_name.as_str();
        if name.is_empty() || !self.control.is_valid_name(name) {
            return Err(ImpairError::InvalidArgument(format!(
                "invalid interface name specified, {:?}",
                name
            )));
        }

        if request.desired_state == InterfaceState::Unspecified {
            return Err(ImpairError::InvalidArgument(
                "interface state must be specified".to_string(),
            ));
        }

        let state = AdminState::try_from(request.desired_state).map_err(|state| {
            ImpairError::InvalidArgument(format!("invalid interface state {} specified", state))
        })?;

        if request.loss_pct >= 100 {
            return Err(ImpairError::InvalidArgument(format!(
                "loss percentage must be 0 <= loss < 100, got: {}",
                request.loss_pct
            )));
        }

        let latency_usec = request.latency_msec.checked_mul(1000).ok_or_else(|| {
            ImpairError::InvalidArgument(format!(
                "latency must be at most {} msec, got: {}",
                u32::MAX / 1000,
                request.latency_msec
            ))
        })?;

        Ok((state, latency_usec))
    }

    async fn replace(&self, qdisc: &QdiscReplace) -> Result<()> {
        let _guard = self.replace_lock.lock().await;

        debug!("calling qdisc replace on interface index {}", qdisc.if_index);
        match tokio::time::timeout(self.apply_timeout, self.control.replace_qdisc(qdisc)).await {
            Ok(Ok(())) => {
                debug!("returned from qdisc replace");
                Ok(())
            }
            Ok(Err(e)) => Err(ImpairError::Internal(format!(
                "cannot apply impairment to interface, {}",
                e
            ))),
            Err(_) => {
                // The kernel may still complete the request after we give up.
                warn!(
                    "qdisc replace on interface index {} exceeded {:?}",
                    qdisc.if_index, self.apply_timeout
                );
                Err(ImpairError::Internal(format!(
                    "cannot apply impairment to interface, timed out after {:?}",
                    self.apply_timeout
                )))
            }
        }
    }
}
