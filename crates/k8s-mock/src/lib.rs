//! Mock Kubernetes API server for testing.
//!
//! Provides an HTTP server that can be used with kubeconfig-based connections.
//! Several servers can be combined into one kubeconfig with
//! [`fleet_kubeconfig`] to exercise multi-cluster code paths.

mod helpers;
pub mod http;

pub use http::{fleet_kubeconfig, HttpMockK8sServer, RunningHttpMockK8sServer};
