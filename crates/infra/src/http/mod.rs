//! HTTP plumbing shared by the OIDC adapters

pub mod client;
pub mod userinfo;

pub use client::{read_json, HttpClient, HttpClientBuilder, RetryPolicy};
pub use userinfo::ReqwestUserInfoClient;
