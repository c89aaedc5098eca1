//! Error reporting core for the PostgreSQL `ereport` shim.
//!
//! Native extension code built against PostgreSQL headers reports errors
//! through `errstart` / `errmsg` / `errfinish`. This crate holds everything
//! behind those entry points that does not touch raw pointers:
//!
//! - [`MessageBuf`]: the bounded, always NUL-terminated message buffer
//! - [`Template`]: a validating printf-style template engine
//! - [`ErrorChannel`]: the begin / record / finish cycle and its output
//! - [`Severity`] and [`SqlState`]: decoders for the integer codes callers pass
//!
//! The C-ABI exports live in `pg_elog_rt`.
//!
//! # Tracing
//!
//! Set `RUST_LOG=pg_elog=debug` to see report boundaries, rejected templates,
//! and truncation. See [`init_tracing`].

mod channel;
mod message;
mod severity;
mod sqlstate;
pub mod template;

use std::sync::Once;

pub use channel::{ErrorChannel, ErrorSite, DIAGNOSTIC_LABEL};
pub use message::{MessageBuf, MESSAGE_CAPACITY};
pub use severity::Severity;
pub use sqlstate::{SqlState, SqlStateError};
pub use template::{
    Arg, ArgKind, ArgSource, FnArgs, NoArgs, SliceArgs, Template, TemplateError,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for error-report diagnostics.
///
/// Does nothing unless `RUST_LOG` is set. Safe to call multiple times, and
/// leaves an already installed global subscriber alone.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            // A host process may have installed its own subscriber.
            let _ = tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .try_init();
        }
    });
}
