use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderValue},
    Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use crate::error::AppError;
use crate::gate::{authorize, Access, RequestGate};
use crate::models::Principal;

/// Rate limits and authenticates every request it wraps, attaching the resulting
/// [`Principal`] to the request extensions.
///
/// Responses that got past authentication carry `Vary: Authorization`.
#[derive(Clone)]
pub struct Admission {
    gate: Arc<RequestGate>,
}

impl Admission {
    pub fn new(gate: Arc<RequestGate>) -> Self {
        Self { gate }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Admission
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AdmissionService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionService {
            service: Rc::new(service),
            gate: self.gate.clone(),
        }))
    }
}

pub struct AdmissionService<S> {
    service: Rc<S>,
    gate: Arc<RequestGate>,
}

impl<S, B> Service<ServiceRequest> for AdmissionService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let gate = Arc::clone(&self.gate);

        Box::pin(async move {
            let client = req.peer_addr().map(|addr| addr.ip().to_string());
            let authorization = req
                .headers()
                .get(header::AUTHORIZATION)
                .map(|value| value.as_bytes().to_vec());

            let principal = gate
                .admit(client.as_deref(), authorization.as_deref())
                .await?;
            req.extensions_mut().insert(principal);

            let mut res = service.call(req).await?;
            res.headers_mut()
                .append(header::VARY, HeaderValue::from_static("Authorization"));
            Ok(res)
        })
    }
}

/// Rejects requests whose principal does not meet `access`.
///
/// Must sit inside [`Admission`].
#[derive(Debug, Clone, Copy)]
pub struct Authorize {
    access: Access,
}

impl Authorize {
    pub fn new(access: Access) -> Self {
        Self { access }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authorize
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthorizeService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthorizeService {
            service,
            access: self.access,
        }))
    }
}

pub struct AuthorizeService<S> {
    service: S,
    access: Access,
}

impl<S, B> Service<ServiceRequest> for AuthorizeService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let decision = match req.extensions().get::<Principal>() {
            Some(principal) => authorize(principal, self.access),
            None => Err(AppError::Internal(format!(
                "no principal attached to request for {}",
                req.path()
            ))),
        };

        match decision {
            Ok(()) => Box::pin(self.service.call(req)),
            Err(app_err) => Box::pin(async move { Err(app_err.into()) }),
        }
    }
}
