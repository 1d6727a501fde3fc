#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! A multi-tenant mailbox gateway: an encrypted IMAP/SMTP credential
//! store, an outbound SMTP sender, on-demand inbox retrieval, and a
//! live long-lived IMAP inbox watcher that pushes "new mail"
//! notifications to HTTP clients over server-sent events.

pub mod config;
pub mod crypto;
pub mod error;
pub mod http;
pub mod imap;
pub mod model;
pub mod registry;
pub mod smtp;
pub mod store;
pub mod watcher;

pub use config::AppConfig;
pub use error::{Error, Result};
