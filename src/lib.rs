#![doc = "The `taskgate` library crate."]
#![doc = ""]
#![doc = "A task-management REST service. Every `/api/v1` request is admitted by a per-client"]
#![doc = "rate limiter and opaque bearer-token authentication before it reaches a handler."]
#![doc = "The binary (`main.rs`) wires these modules into an actix-web server."]

pub mod auth;
pub mod background;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod models;
pub mod notify;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod storage;

pub use error::AppError;
