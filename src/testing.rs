//! In-memory kernel collaborator used by unit tests

use crate::driver::{is_valid_interface_name, KernelControl, QdiscReplace};
use crate::errors::DriverError;
use crate::types::AdminState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Records every call and answers from a fixed interface table
#[derive(Default)]
pub(crate) struct RecordingKernel {
    links: HashMap<String, u32>,
    pub(crate) fail_admin: bool,
    pub(crate) fail_replace: bool,
    pub(crate) replace_delay: Option<Duration>,
    closed: AtomicBool,
    pub(crate) resolve_calls: AtomicUsize,
    pub(crate) close_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) peak_in_flight: AtomicUsize,
    pub(crate) admin_calls: Mutex<Vec<(String, u32, AdminState)>>,
    pub(crate) replaced: Mutex<Vec<QdiscReplace>>,
}

impl RecordingKernel {
    pub(crate) fn with_links(links: &[(&str, u32)]) -> Self {
        Self {
            links: links
                .iter()
                .map(|(name, index)| (name.to_string(), *index))
                .collect(),
            ..Default::default()
        }
    }

    pub(crate) fn kernel_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
            + self.admin_calls.lock().len()
            + self.replaced.lock().len()
    }

    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverError::SessionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KernelControl for RecordingKernel {
    fn is_valid_name(&self, name: &str) -> bool {
        is_valid_interface_name(name)
    }

    async fn resolve_index(&self, name: &str) -> Result<u32, DriverError> {
        self.check_open()?;
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.links
            .get(name)
            .copied()
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    async fn set_admin_state(
        &self,
        name: &str,
        if_index: u32,
        state: AdminState,
    ) -> Result<(), DriverError> {
        self.check_open()?;
        self.admin_calls
            .lock()
            .push((name.to_string(), if_index, state));
        if self.fail_admin {
            return Err(DriverError::Other("operation not permitted".into()));
        }
        Ok(())
    }

    async fn replace_qdisc(&self, qdisc: &QdiscReplace) -> Result<(), DriverError> {
        self.check_open()?;
        self.replaced.lock().push(qdisc.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.replace_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_replace {
            return Err(DriverError::Other("invalid argument".into()));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(DriverError::SessionClosed);
        }
        Ok(())
    }
}
