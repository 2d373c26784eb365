//! Request/response values and the network primitive.

pub mod client;
#[cfg(test)]
pub mod mock;
pub mod types;

pub use client::{HttpClient, Network};
pub use types::{Request, RequestMode, Response, ResponseType};
