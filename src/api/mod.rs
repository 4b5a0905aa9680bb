//! HTTP client wrapper for the expense-sharing API.

mod client;
mod error;
mod response;
mod session;

pub use client::ApiClient;
pub use error::ApiError;
pub use response::{ApiResponse, ResponseOrigin};
pub use session::{Session, SessionEvent, TOKEN_KEY};
