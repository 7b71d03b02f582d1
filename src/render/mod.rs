//! Template rendering of buffered events
//!
//! The whole ordered batch is handed to one template invocation as `events`,
//! so templates can place separators between scenarios.

mod formats;
mod functions;

pub use formats::{OutputFormat, FILE_PREFIX, GATLING_TEMPLATE, KARATE_TEMPLATE};
pub use functions::{FunctionSet, TIMESTAMP_FORMAT};

use minijinja::{context, Environment};

use crate::event::HttpEvent;
use crate::Result;

/// Renders event batches; the function set is fixed at construction
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Create a renderer with the given function set
    #[must_use]
    pub fn new(functions: &FunctionSet) -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        functions.register(&mut env);

        Self { env }
    }

    /// Render `events` through `format`
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReplayError::Template`] on parse or execution failure
    pub fn render(&self, events: &[HttpEvent], format: &OutputFormat) -> Result<String> {
        Ok(self
            .env
            .render_str(&format.template, context! { events => events })?)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&FunctionSet::default())
    }
}
