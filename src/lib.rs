//! A lightweight in-memory time-series database: a storage engine, a small
//! binary wire protocol, and a single-threaded event-driven server.

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

pub mod codec;
pub mod config;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod store;
