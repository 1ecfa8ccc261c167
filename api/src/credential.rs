use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use serper_relay_core::credential::{
    API_KEY_QUERY_PARAM, CredentialCandidates, Resolution, ResolvedCredential, resolve,
};
use tower::{Layer, Service, ServiceExt};

use crate::error::AppError;
use crate::middleware::request_id;
use crate::routes::table::leading_segment;

/// Tower Layer that resolves the request's credential and inserts the
/// [`ResolvedCredential`] into request extensions.
///
/// Applied only to credential-required routes; a request with no credential
/// from any carrier is rejected with 401 before reaching the handler.
#[derive(Clone)]
pub struct ResolveCredentialLayer {
    path_segment: bool,
    default: Option<Arc<str>>,
    carriers: Arc<[String]>,
}

impl ResolveCredentialLayer {
    pub fn new(path_segment: bool, default: Option<Arc<str>>, carriers: Vec<String>) -> Self {
        Self {
            path_segment,
            default,
            carriers: carriers.into(),
        }
    }
}

impl<S> Layer<S> for ResolveCredentialLayer {
    type Service = ResolveCredentialService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResolveCredentialService {
            inner,
            path_segment: self.path_segment,
            default: self.default.clone(),
            carriers: self.carriers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ResolveCredentialService<S> {
    inner: S,
    path_segment: bool,
    default: Option<Arc<str>>,
    carriers: Arc<[String]>,
}

impl<S> Service<Request> for ResolveCredentialService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let not_ready = self.inner.clone();
        let ready = std::mem::replace(&mut self.inner, not_ready);

        // At most one credential per request; an earlier stage wins.
        if req.extensions().get::<ResolvedCredential>().is_none() {
            match resolve_request(&req, self.path_segment, self.default.as_deref()) {
                Resolution::Resolved(credential) => {
                    tracing::debug!(
                        event = "credential_resolved",
                        path = %req.uri().path(),
                        source = credential.source().as_str(),
                        credential = %credential.masked(),
                        "Credential resolved"
                    );
                    req.extensions_mut().insert(credential);
                }
                Resolution::Missing => {
                    let request_id = request_id::current(req.headers());
                    tracing::info!(
                        event = "credential_missing",
                        request_id = %request_id,
                        path = %req.uri().path(),
                        "Rejected request without credential"
                    );
                    let error = AppError::MissingCredential {
                        request_id,
                        carriers: self.carriers.to_vec(),
                    };
                    return Box::pin(async move { Ok(error.into_response()) });
                }
            }
        }

        Box::pin(async move { Ok(ready.oneshot(req).await.into_response()) })
    }
}

/// Gather the candidates of every carrier and apply the fixed precedence.
fn resolve_request(req: &Request, path_segment: bool, default: Option<&str>) -> Resolution {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let query = req.uri().query().and_then(query_credential);
    let segment = if path_segment {
        leading_segment(req.uri().path())
    } else {
        None
    };

    resolve(CredentialCandidates {
        authorization,
        query: query.as_deref(),
        path_segment: segment,
        default,
    })
}

/// First `api_key` value of a raw query string, percent-decoded.
fn query_credential(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == API_KEY_QUERY_PARAM)
        .map(|(_, value)| value.into_owned())
}
