//! Integration tests for the deployment sync engine

#[allow(dead_code)]
mod support;

mod test_deploy_flow;
mod test_rpc_http;
mod test_security;
mod test_uploads;
