//! Outbound HTTP capability for node scripts.
//!
//! Scripts never get a raw client. Every request goes through [`HttpClient`],
//! which checks the URL against an [`HttpPolicy`] (also on redirects), bounds
//! the request time, and caps the response size.

mod client;
mod error;
mod policy;

pub use client::{FetchBody, FetchRequest, FetchResponse, HttpClient};
pub use error::HttpError;
pub use policy::HttpPolicy;
