//! # CLI Module
//!
//! Command-line front end for the dispatch pipeline.
//!
//! ## Commands
//!
//! ### `check`
//!
//! Load a configuration file, apply `BRRTG_*` overrides, build the pipeline (which
//! resolves the configured middleware) and print a summary:
//!
//! ```bash
//! brrtgate check --config gateway.yaml
//! ```
//!
//! ### `call`
//!
//! Resolve a configured method, bind the built-in echo handler to it and dispatch the
//! call through the full pipeline. Each envelope is printed as the JSON a transport
//! would send (`status`, `reason`, `headers`, `body`):
//!
//! ```bash
//! brrtgate call --config gateway.yaml --class Orders --method list \
//!     --caller alice --arg page=2 --repeat 2
//!
//! # Force a domain failure with the full development disclosure
//! brrtgate call --config gateway.yaml --class Orders --method list \
//!     --arg fail=domain --environment development
//! ```
//!
//! An unknown class or method, or an HTTP method other than the configured one, yields
//! the `404` envelope. A pipeline-fatal error ends the command with a non-zero exit.

mod commands;


pub use commands::{render, run, run_cli, Cli, Commands};
