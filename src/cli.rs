//! CLI domain: parse, route, output, and presentation only.
//! Resolution logic lives in the resolver; handlers stay thin.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{exit_code, map_error};
pub use parse::{Cli, Commands};
pub use presentation::{format_json, format_stats_text, format_types_text};
pub use route::RunContext;
