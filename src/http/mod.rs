//! HTTP request layer: transport, response classification and retries.

mod executor;
mod transport;

pub use executor::{RETRYABLE_KINDS, RequestExecutor, RequestSpec, classify_response};
#[cfg(test)]
pub use transport::MockTransport;
pub use transport::{RawResponse, ReqwestTransport, Timeout, Transport, USER_AGENT};
