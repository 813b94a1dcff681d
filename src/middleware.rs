use std::rc::Rc;
use std::sync::Arc;

use actix_service::{forward_ready, Service};
use actix_web::body::EitherBody;
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage};
use futures::future::{ok, LocalBoxFuture, Ready};

use crate::error::AppError;
use crate::token::{TokenService, TOKEN_COOKIE};

/// Gate for routes that need a session. Reads the `token` cookie, verifies it
/// and stores the [`SessionClaims`](crate::token::SessionClaims) in the request
/// extensions. Rejected requests get a 401 and never reach the handler.
pub struct SessionGuard {
    tokens: Arc<TokenService>,
}

impl SessionGuard {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        SessionGuard { tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SessionGuardMiddleware<S>;
    type InitError = ();

    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(SessionGuardMiddleware {
            service: Rc::new(service),
            tokens: self.tokens.clone(),
        })
    }
}

pub struct SessionGuardMiddleware<S> {
    service: Rc<S>,
    tokens: Arc<TokenService>,
}

impl<S, B> Service<ServiceRequest> for SessionGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let tokens = self.tokens.clone();

        Box::pin(async move {
            let verdict = match req.cookie(TOKEN_COOKIE) {
                Some(cookie) => tokens.verify(cookie.value()),
                None => {
                    log::debug!("No {} cookie on {}", TOKEN_COOKIE, req.path());
                    Err(AppError::Unauthorized)
                }
            };

            match verdict {
                Ok(claims) => {
                    log::debug!("Session verified for {:?}", claims.email());
                    req.extensions_mut().insert(claims);
                    service.call(req).await.map(ServiceResponse::map_into_left_body)
                }
                Err(e) => Ok(req.error_response(e).map_into_right_body()),
            }
        })
    }
}
