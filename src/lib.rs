#![warn(
    clippy::pedantic,
    clippy::nursery,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::format_push_string,
    clippy::if_then_some_else_none,
    clippy::map_err_ignore,
    clippy::panic_in_result_fn,
    clippy::single_char_lifetime_names,
    clippy::str_to_string,
    clippy::unwrap_used,
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    meta_variable_misuse,
    missing_copy_implementations,
    missing_debug_implementations,
    noop_method_call,
    single_use_lifetimes,
    unreachable_pub,
    unused_lifetimes,
    unused_macro_rules,
    unused_qualifications
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::return_self_not_must_use,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::redundant_pub_crate,
    clippy::single_match_else
)]

//! Control plane linking an observatory host to ASCOM Alpaca REST devices
//! and a PHD2 autoguiding daemon, with a task runtime that composes both
//! into retry-capable, observable workflows.
//!
//! The crate is organized in the same three layers the host system is
//! designed around:
//!
//! - [`alpaca`] — HTTP connection pool, Alpaca transport, typed device
//!   client and image-array codec.
//! - [`phd2`] — persistent line-framed JSON-RPC transport, event dispatch
//!   and the high-level client facade.
//! - [`task`] — the uniform task contract, the task factory/registry and
//!   the composite guiding workflows built on top of the two transports.

pub mod alpaca;
pub mod config;
pub mod errors;
pub mod phd2;
pub mod task;

pub use errors::{ASCOMError, ASCOMErrorCode};
