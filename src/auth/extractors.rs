use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};

use crate::error::AppError;
use crate::models::{Principal, User};

/// The principal `Admission` attached to this request.
///
/// Only usable on routes behind `Admission`; elsewhere extraction fails with a 500.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl FromRequest for CurrentPrincipal {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let principal = req.extensions().get::<Principal>().cloned();
        ready(match principal {
            Some(principal) => Ok(CurrentPrincipal(principal)),
            None => Err(AppError::Internal(format!(
                "no principal attached to request for {}",
                req.path()
            ))
            .into()),
        })
    }
}

/// The authenticated user. Anonymous callers get a 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = ActixError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let principal = req.extensions().get::<Principal>().cloned();
        ready(match principal {
            Some(Principal::User(user)) => Ok(CurrentUser(user)),
            Some(Principal::Anonymous) => Err(AppError::Unauthorized.into()),
            None => Err(AppError::Internal(format!(
                "no principal attached to request for {}",
                req.path()
            ))
            .into()),
        })
    }
}
