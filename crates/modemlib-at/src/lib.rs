//! AT command engine for cellular modems.
//!
//! One tokio task owns the serial transport and turns the modem's mixed
//! stream of command replies and unsolicited result codes into typed
//! [`ModemEvent`](modemlib_core::ModemEvent)s, while serving call and SMS
//! operations requested through a [`Modem`] handle.
//!
//! # Architecture
//!
//! - [`protocol`] -- line framing and single-line reply parsing
//! - [`session`] -- the per-line state machine and its dispatch table
//! - [`reassembly`] -- multipart SMS buffering
//! - [`commands`] -- AT command strings
//! - [`io`] -- IO task types, spawn, and the select loop
//! - [`modem`] / [`builder`] -- the public handle and how to build one

pub mod builder;
pub mod commands;
pub mod io;
pub mod modem;
pub mod protocol;
pub mod reassembly;
pub mod session;

pub use builder::ModemBuilder;
pub use modem::Modem;
