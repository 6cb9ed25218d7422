pub mod error;
pub mod health;
pub mod ticket;

pub use error::{AppError, AppResult};
