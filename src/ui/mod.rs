//! Console output for the CLI
//!
//! Interactive terminals get colored symbols and a spinner; CI and piped
//! output get plain bracketed prefixes.
//!
//! ```rust,ignore
//! use devcycle::ui::{self, TaskSpinner, UiContext};
//!
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Building images...");
//! spinner.stop("Built 2 image(s)");
//! ui::step_warn_hint(&ctx, "docker is not installed", "Install docker");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{intro, remark, step_info, step_ok, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
