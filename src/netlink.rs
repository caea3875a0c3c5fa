//! rtnetlink-backed kernel control session
//!
//! One route-netlink socket is opened at startup and shared by every request.
//! Link lookups and admin state changes go through rtnetlink's link API; the
//! netem qdisc is sent as a raw `RTM_NEWQDISC` with `NLM_F_REPLACE`, with the
//! `tc_netem_qopt` structure carried in `TCA_OPTIONS`.

use crate::driver::{is_valid_interface_name, KernelControl, QdiscReplace};
use crate::errors::DriverError;
use crate::types::AdminState;
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use rtnetlink::packet_core::{
    DefaultNla, ErrorMessage, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE,
    NLM_F_REPLACE, NLM_F_REQUEST,
};
use rtnetlink::packet_route::tc::{TcAttribute, TcHandle, TcMessage};
use rtnetlink::packet_route::RouteNetlinkMessage;
use rtnetlink::{Handle, LinkUnspec};
use std::num::NonZeroI32;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Long-lived netlink session owned by the service
pub struct RtnetlinkSession {
    handle: Handle,
    connection: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RtnetlinkSession {
    /// Open the route-netlink socket and spawn its connection task.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open() -> Result<Self, DriverError> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        let task = tokio::spawn(connection);

        info!("Opened rtnetlink session");
        Ok(Self {
            handle,
            connection: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        })
    }

    fn handle(&self) -> Result<Handle, DriverError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DriverError::SessionClosed);
        }
        Ok(self.handle.clone())
    }
}

impl std::fmt::Debug for RtnetlinkSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtnetlinkSession")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

#[async_trait]
impl KernelControl for RtnetlinkSession {
    fn is_valid_name(&self, name: &str) -> bool {
        is_valid_interface_name(name)
    }

    async fn resolve_index(&self, name: &str) -> Result<u32, DriverError> {
        let handle = self.handle()?;
        let mut links = handle.link().get().match_name(name.to_string()).execute();

        match links.try_next().await {
            Ok(Some(link)) => Ok(link.header.index),
            Ok(None) => Err(DriverError::NotFound(name.to_string())),
            Err(rtnetlink::Error::NetlinkError(e)) if is_no_such_device(&e) => {
                Err(DriverError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_admin_state(
        &self,
        name: &str,
        if_index: u32,
        state: AdminState,
    ) -> Result<(), DriverError> {
        let handle = self.handle()?;
        let message = match state {
            AdminState::Up => LinkUnspec::new_with_index(if_index).up().build(),
            AdminState::Down => LinkUnspec::new_with_index(if_index).down().build(),
        };

        debug!("Setting {} (index {}) admin state {:?}", name, if_index, state);
        handle.link().set(message).execute().await?;
        Ok(())
    }

    async fn replace_qdisc(&self, qdisc: &QdiscReplace) -> Result<(), DriverError> {
        let mut handle = self.handle()?;

        let responses = handle.request(replace_message(qdisc)?)?;
        await_ack(responses).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(DriverError::SessionClosed);
        }

        let task = self.connection.lock().take();
        let Some(task) = task else {
            return Err(DriverError::SessionClosed);
        };

        task.abort();
        match task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                return Err(DriverError::Other(format!(
                    "netlink connection task failed: {}",
                    e
                )))
            }
        }

        info!("Closed rtnetlink session");
        Ok(())
    }
}

fn is_no_such_device(e: &ErrorMessage) -> bool {
    e.code.map(NonZeroI32::get) == Some(-libc::ENODEV)
}

/// Drain the responses to an `NLM_F_ACK` request.
///
/// An error message without a code is the ACK. A stream that ends before the
/// ACK means the connection went away under the request.
async fn await_ack<S>(responses: S) -> Result<(), DriverError>
where
    S: Stream<Item = NetlinkMessage<RouteNetlinkMessage>>,
{
    futures::pin_mut!(responses);

    let mut acked = false;
    while let Some(response) = responses.next().await {
        if let NetlinkPayload::Error(e) = response.payload {
            if e.code.is_some() {
                return Err(rtnetlink::Error::NetlinkError(e).into());
            }
            acked = true;
        }
    }

    if acked {
        Ok(())
    } else {
        Err(DriverError::SessionClosed)
    }
}

/// Build the `RTM_NEWQDISC` request that creates or replaces `qdisc`
pub fn replace_message(
    qdisc: &QdiscReplace,
) -> Result<NetlinkMessage<RouteNetlinkMessage>, DriverError> {
    let index = i32::try_from(qdisc.if_index).map_err(|_| {
        DriverError::Other(format!("interface index {} out of range", qdisc.if_index))
    })?;

    let mut tc_message = TcMessage::with_index(index);
    tc_message.header.parent = TcHandle::from(qdisc.parent);
    tc_message.header.handle = TcHandle::from(qdisc.handle);

    tc_message
        .attributes
        .push(TcAttribute::Kind(qdisc.kind.to_string()));
    tc_message
        .attributes
        .push(TcAttribute::Other(DefaultNla::new(
            libc::TCA_OPTIONS,
            qdisc.netem.to_qopt_bytes(),
        )));

    let mut request = NetlinkMessage::from(RouteNetlinkMessage::NewQueueDiscipline(tc_message));
    request.header.flags = NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE;
    Ok(request)
}
