pub mod health;
pub mod tasks;
pub mod tokens;
pub mod users;

use actix_web::web;

use crate::auth::Authorize;
use crate::error::AppError;
use crate::gate::Access;

/// Registers every `/api/v1` route. The caller wraps the enclosing scope in
/// [`Admission`](crate::auth::Admission).
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .service(
            web::scope("/users")
                .service(users::register_user)
                .service(users::activate_user)
                .service(users::reset_password),
        )
        .service(
            web::scope("/tokens")
                .service(tokens::create_authentication_token)
                .service(tokens::delete_authentication_tokens)
                .service(tokens::create_password_reset_token),
        )
        .service(
            web::scope("/tasks")
                .wrap(Authorize::new(Access::Activated))
                .service(tasks::get_tasks)
                .service(tasks::create_task)
                .service(tasks::get_task)
                .service(tasks::update_task)
                .service(tasks::delete_task),
        );
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1 << 20)
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}
