mod error;
mod health;
mod upload;
pub mod webhook;

pub use error::ErrorResponse;
pub use health::health_handler;
pub use upload::{AcceptedResponse, upload_handler};
pub use webhook::webhook_handler;
