//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use netns_impair::driver::{is_valid_interface_name, KernelControl, QdiscReplace};
use netns_impair::service::{router, ImpairService};
use netns_impair::{AdminState, DriverError, FixedTickRate, ImpairmentEngine};
use parking_lot::Mutex;

/// Kernel stand-in that knows a fixed set of interfaces
#[derive(Default)]
pub struct FakeKernel {
    links: HashMap<String, u32>,
    pub admin_calls: Mutex<Vec<(String, AdminState)>>,
    pub replaced: Mutex<Vec<QdiscReplace>>,
    pub closed: Mutex<bool>,
}

impl FakeKernel {
    pub fn new(links: &[(&str, u32)]) -> Self {
        Self {
            links: links.iter().map(|(n, i)| (n.to_string(), *i)).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.admin_calls.lock().len() + self.replaced.lock().len()
    }
}

#[async_trait]
impl KernelControl for FakeKernel {
    fn is_valid_name(&self, name: &str) -> bool {
        is_valid_interface_name(name)
    }

    async fn resolve_index(&self, name: &str) -> Result<u32, DriverError> {
        self.links
            .get(name)
            .copied()
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    async fn set_admin_state(
        &self,
        name: &str,
        _if_index: u32,
        state: AdminState,
    ) -> Result<(), DriverError> {
        self.admin_calls.lock().push((name.to_string(), state));
        Ok(())
    }

    async fn replace_qdisc(&self, qdisc: &QdiscReplace) -> Result<(), DriverError> {
        if qdisc.if_index == 99 {
            return Err(DriverError::Other("device or resource busy".into()));
        }
        self.replaced.lock().push(qdisc.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Router and service over a fake kernel with `eth0` (2), `eth1` (3) and
/// `busy0` (99, whose qdisc replace always fails).
pub fn test_app() -> (Router, Arc<ImpairService>, Arc<FakeKernel>) {
    let kernel = Arc::new(FakeKernel::new(&[("eth0", 2), ("eth1", 3), ("busy0", 99)]));
    let engine = ImpairmentEngine::new(kernel.clone(), Arc::new(FixedTickRate::new(15.625)));
    let service = Arc::new(ImpairService::new(engine, kernel.clone()));
    (router(service.clone()), service, kernel)
}
