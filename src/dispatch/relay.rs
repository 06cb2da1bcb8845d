//! Default method handler: relays calls to the configured backend.
//!
//! Every non-built-in method becomes `POST {upstream_url}` with body
//! `{"method": ..., "params": ...}`, sent through the shared outbound
//! executor so the rate limit, concurrency bound, retries and cancellation
//! all apply. The backend's JSON body becomes the result.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{header, HeaderName, HeaderValue};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::config::OutboundConfig;
use crate::dispatch::context::DispatchContext;
use crate::dispatch::handler::{DispatchError, MethodHandler};
use crate::resilience::{ExecutorOptions, OutboundExecutor, OutboundRequest};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid upstream URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Upstream token is not a valid header value")]
    InvalidToken,
}

#[derive(Debug)]
pub struct RelayHandler {
    executor: Arc<OutboundExecutor>,
    upstream: Option<Url>,
}

impl RelayHandler {
    pub fn new(executor: Arc<OutboundExecutor>, upstream: Option<Url>) -> Self {
        Self { executor, upstream }
    }

    /// Build the executor (upstream token as a base `Authorization` header)
    /// and the handler from configuration.
    pub fn from_config(config: &OutboundConfig) -> Result<Self, RelayError> {
        let upstream = config
            .upstream_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|source| RelayError::InvalidUrl {
                    url: raw.to_string(),
                    source,
                })
            })
            .transpose()?;

        let mut options = ExecutorOptions::from_config(config);
        if let Some(token) = &config.upstream_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| RelayError::InvalidToken)?;
            value.set_sensitive(true);
            options = options.with_base_header(header::AUTHORIZATION, value);
        }

        Ok(Self::new(Arc::new(OutboundExecutor::new(options)), upstream))
    }

    pub fn executor(&self) -> &Arc<OutboundExecutor> {
        &self.executor
    }

    pub fn is_configured(&self) -> bool {
        self.upstream.is_some()
    }
}

#[async_trait]
impl MethodHandler for RelayHandler {
    async fn handle(
        &self,
        ctx: &DispatchContext,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, DispatchError> {
        let Some(upstream) = &self.upstream else {
            return Err(DispatchError::MethodNotFound(method.to_string()));
        };

        let body = json!({ "method": method, "params": params });
        let mut request = OutboundRequest::post_json(upstream.clone(), &body)
            .map_err(|e| DispatchError::Internal(e.to_string()))?;

        // Caller-supplied context headers travel along; the caller's own
        // Authorization stays at the gateway.
        for (name, value) in ctx.auth().resolved_headers() {
            if name == header::AUTHORIZATION.as_str() {
                continue;
            }
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
                request.headers.insert(name, value);
            }
        }

        let result = self.executor.execute_json::<Value>(request, ctx.cancel_token()).await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthStrategy;
    use crate::resilience::{OutboundResponse, Transport, TransportError};
    use crate::rpc::RequestId;
    use crate::security::AuthContext;
    use axum::http::{HeaderMap, StatusCode};
    use bytes::Bytes;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<OutboundRequest>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            Ok(OutboundResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from_static(br#"{"battery_level":81}"#),
            })
        }
    }

    fn ctx(headers: &[(&str, &str)]) -> DispatchContext {
        let raw: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DispatchContext::new(
            "s1",
            Some(RequestId::from(1)),
            AuthContext::unauthenticated(AuthStrategy::None, raw),
            None,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_unconfigured_relay_reports_method_not_found() {
        let handler = RelayHandler::from_config(&OutboundConfig::default()).unwrap();
        assert!(!handler.is_configured());

        let err = handler.handle(&ctx(&[]), "get_battery", None).await.unwrap_err();
        assert!(matches!(err, DispatchError::MethodNotFound(ref m) if m == "get_battery"));
    }

    #[tokio::test]
    async fn test_relays_method_and_params() {
        let transport = Arc::new(RecordingTransport::default());
        let executor = OutboundExecutor::with_transport(ExecutorOptions::default(), transport.clone());
        let upstream = Url::parse("http://vehicle-api.test/rpc").unwrap();
        let handler = RelayHandler::new(Arc::new(executor), Some(upstream));

        let result = handler
            .handle(
                &ctx(&[("authorization", "Bearer client"), ("x-vehicle-vin", "5YJ3")]),
                "get_battery",
                Some(json!({"vin": "5YJ3"})),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"battery_level": 81}));

        let requests = transport.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.method, axum::http::Method::POST);
        assert_eq!(sent.headers["x-vehicle-vin"], "5YJ3");
        assert!(!sent.headers.contains_key("authorization"));

        let body: Value = serde_json::from_slice(sent.body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"method": "get_battery", "params": {"vin": "5YJ3"}}));
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let config = OutboundConfig {
            upstream_url: Some("not a url".into()),
            ..OutboundConfig::default()
        };
        assert!(matches!(
            RelayHandler::from_config(&config),
            Err(RelayError::InvalidUrl { .. })
        ));
    }
}
