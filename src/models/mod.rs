pub mod task;
pub mod token;
pub mod user;

pub use task::{Task, TaskInput, TaskPriority, TaskQuery, TaskStatus};
pub use token::{Token, TokenHash, TokenRecord, TokenScope};
pub use user::{NewUser, Principal, User};
