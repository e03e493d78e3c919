mod client_builder;
mod client_error;
mod client_handle;

pub use client_builder::ClientBuilder;
pub use client_error::ClientError;
pub use client_handle::Client;
