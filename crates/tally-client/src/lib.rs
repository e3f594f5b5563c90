//! HTTP client for the marketplace seller API.
//!
//! All traffic goes through a [`Transport`](transport::Transport) so the retry,
//! pagination and report-polling logic can be exercised against scripted
//! responses. [`ApiClient`] layers retry and completeness accounting on top;
//! [`endpoints`] implements the concrete list/paging protocols.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod paginate;
pub mod pool;
pub mod records;
pub mod reports;
pub mod retry;
pub mod sheet;
pub mod transport;

pub use client::ApiClient;
pub use error::{ClientError, Result};
pub use pool::WorkerPool;
pub use retry::{CallStats, CallStatsSnapshot, RetryPolicy};
pub use transport::{Credentials, FnTransport, HttpResponse, ReqwestTransport, Transport};
