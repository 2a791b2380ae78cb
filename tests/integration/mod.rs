//! Integration tests for the cape resolver

mod cli_context;
mod config_loading;
mod resolve_flow;
