mod client;
mod dev_backend;

pub use client::HttpTransport;
pub use dev_backend::DevBackend;
