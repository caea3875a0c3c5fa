//! Service facade and HTTP transport
//!
//! [`ImpairService`] owns the kernel session for the life of the process and
//! exposes the engine as a single `SetInterface` call. It only checks the
//! shape of a request; everything semantic is left to the engine.

use crate::driver::KernelControl;
use crate::engine::ImpairmentEngine;
use crate::errors::{DriverError, ImpairError, Result};
use crate::types::{ImpairmentRequest, InterfaceStateParams, SetInterfaceRequest, SetInterfaceResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Path of the `SetInterface` call
pub const SET_INTERFACE_PATH: &str = "/v1/set_interface";

/// Path of the liveness probe
pub const HEALTH_PATH: &str = "/healthz";

/// Lifecycle of the facade. `Running -> Stopped` is one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
}

pub struct ImpairService {
    engine: RwLock<Option<Arc<ImpairmentEngine>>>,
    session: Arc<dyn KernelControl>,
}

impl ImpairService {
    /// Wrap `engine`, taking ownership of the `session` it runs on
    pub fn new(engine: ImpairmentEngine, session: Arc<dyn KernelControl>) -> Self {
        Self {
            engine: RwLock::new(Some(Arc::new(engine))),
            session,
        }
    }

    pub fn state(&self) -> ServiceState {
        if self.engine.read().is_some() {
            ServiceState::Running
        } else {
            ServiceState::Stopped
        }
    }

    /// Handle one `SetInterface` call
    pub async fn set_interface(&self, request: SetInterfaceRequest) -> Result<SetInterfaceResponse> {
        let name = request.name.ok_or_else(|| {
            ImpairError::InvalidArgument("name is a required argument".to_string())
        })?;
        let params = request.params.ok_or_else(|| {
            ImpairError::InvalidArgument("params is a required argument".to_string())
        })?;

        let engine = self.engine.read().clone().ok_or_else(|| {
            ImpairError::Unavailable("impairment service is stopped".to_string())
        })?;

        let applied = engine
            .apply(&ImpairmentRequest {
                interface_name: name,
                desired_state: params.state,
                loss_pct: params.loss_pct,
                latency_msec: params.latency_msec,
            })
            .await?;

        Ok(SetInterfaceResponse {
            name: applied.name,
            params: InterfaceStateParams {
                state: applied.state,
                loss_pct: applied.loss_pct,
                latency_msec: applied.latency_msec,
            },
        })
    }

    /// Stop accepting calls and close the kernel session.
    ///
    /// Only the first call closes the session; later calls return `Ok`.
    pub async fn stop(&self) -> std::result::Result<(), DriverError> {
        let engine = self.engine.write().take();
        if engine.is_none() {
            return Ok(());
        }

        info!("Stopping impairment service");
        self.session.close().await
    }
}

/// Error body returned for failed calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ImpairError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ImpairError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ImpairError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImpairError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ImpairError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.message().to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthBody {
    pub state: ServiceState,
}

/// Build the HTTP router for `service`
pub fn router(service: Arc<ImpairService>) -> Router {
    Router::new()
        .route(SET_INTERFACE_PATH, post(set_interface))
        .route(HEALTH_PATH, get(health))
        .with_state(service)
}

/// Serve `service` on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    service: Arc<ImpairService>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn set_interface(
    State(service): State<Arc<ImpairService>>,
    body: std::result::Result<Json<SetInterfaceRequest>, JsonRejection>,
) -> std::result::Result<Json<SetInterfaceResponse>, ImpairError> {
    let Json(request) = body.map_err(|rejection| {
        ImpairError::InvalidArgument(format!("malformed request, {}", rejection.body_text()))
    })?;

    match service.set_interface(request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!("SetInterface failed: {}", e);
            Err(e)
        }
    }
}

async fn health(State(service): State<Arc<ImpairService>>) -> (StatusCode, Json<HealthBody>) {
    let state = service.state();
    let status = match state {
        ServiceState::Running => StatusCode::OK,
        ServiceState::Stopped => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(HealthBody { state }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netem::FixedTickRate;
    use crate::testing::RecordingKernel;
    use crate::types::InterfaceState;
    use std::sync::atomic::Ordering;

    fn service_with(kernel: Arc<RecordingKernel>) -> ImpairService {
        let engine = ImpairmentEngine::new(kernel.clone(), Arc::new(FixedTickRate::new(1.0)));
        ImpairService::new(engine, kernel)
    }

    fn request(name: &str, state: InterfaceState, loss_pct: u32) -> SetInterfaceRequest {
        SetInterfaceRequest {
            name: Some(name.to_string()),
            params: Some(InterfaceStateParams {
                state,
                loss_pct,
                latency_msec: 10,
            }),
        }
    }

    #[tokio::test]
    async fn test_set_interface_echoes_params() {
        let kernel = Arc::new(RecordingKernel::with_links(&[("eth0", 4)]));
        let service = service_with(kernel.clone());

        let response = service
            .set_interface(request("eth0", InterfaceState::AdminDown, 25))
            .await
            .unwrap();
        assert_eq!(response.name, "eth0");
        assert_eq!(response.params.state, InterfaceState::AdminDown);
        assert_eq!(response.params.loss_pct, 25);
        assert_eq!(response.params.latency_msec, 10);
        assert_eq!(kernel.replaced.lock()[0].netem.latency, 10_000);
    }

    #[tokio::test]
    async fn test_missing_params_rejected() {
        let kernel = Arc::new(RecordingKernel::with_links(&[("eth0", 4)]));
        let service = service_with(kernel.clone());

        let result = service
            .set_interface(SetInterfaceRequest {
                name: Some("eth0".to_string()),
                params: None,
            })
            .await;
        assert_eq!(
            result,
            Err(ImpairError::InvalidArgument(
                "params is a required argument".to_string()
            ))
        );

        let result = service
            .set_interface(SetInterfaceRequest {
                name: None,
                params: Some(InterfaceStateParams::default()),
            })
            .await;
        assert!(matches!(result, Err(ImpairError::InvalidArgument(_))));
        assert_eq!(kernel.kernel_calls(), 0);
    }

    #[tokio::test]
    async fn test_engine_errors_pass_through() {
        let kernel = Arc::new(RecordingKernel::with_links(&[("eth0", 4)]));
        let service = service_with(kernel.clone());

        let result = service
            .set_interface(request("eth0", InterfaceState::Up, 100))
            .await;
        assert!(matches!(result, Err(ImpairError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_stop_closes_once() {
        let kernel = Arc::new(RecordingKernel::with_links(&[("eth0", 4)]));
        let service = service_with(kernel.clone());
        assert_eq!(service.state(), ServiceState::Running);

        service.stop().await.unwrap();
        service.stop().await.unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert_eq!(kernel.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_calls_after_stop_fail_cleanly() {
        let kernel = Arc::new(RecordingKernel::with_links(&[("eth0", 4)]));
        let service = service_with(kernel.clone());
        service.stop().await.unwrap();

        let result = service
            .set_interface(request("eth0", InterfaceState::Up, 0))
            .await;
        assert!(matches!(result, Err(ImpairError::Unavailable(_))));
        assert_eq!(kernel.kernel_calls(), 0);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ImpairError::InvalidArgument(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ImpairError::Internal(String::new()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ImpairError::Unavailable(String::new()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
