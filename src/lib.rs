#![warn(missing_docs)]

//! <div class="warning">
//!
//! Note: Bunpro has no public API, the endpoints used here may change at any time.
//!
//! </div>
//!
//! # As a library
//!
//! As a library, usually you prefer to log in with [`api::Session`],
//! then use [`backup`] and [`restore`] with it.
//!
//! Both only talk to Bunpro through the [`api::Frontend`] trait.
//!
//! # As a binary
//!
//! In addition to the above, you also need [`cli`] to build the command line.
//!
//! See `main.rs` to know how to assemble these modules as a binary.

#[cfg(not(any(
    feature = "default-tls",
    feature = "native-tls",
    feature = "native-tls-vendored",
    feature = "native-tls-alpn",
    feature = "rustls-tls",
    feature = "rustls-tls-manual-roots",
    feature = "rustls-tls-webpki-roots",
    feature = "rustls-tls-native-roots",
)))]
compile_error!("at least one tls feature must be enabled, Bunpro is only served over https");

pub mod api;
pub mod backup;
#[cfg(feature = "cli")]
pub mod cli;
pub mod restore;

pub mod config;
pub mod deck;
pub mod store;
pub mod tool;
