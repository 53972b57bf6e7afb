//! Report generation module.
//!
//! This module provides report generation in multiple formats:
//! - JSON: Machine-readable structured output
//! - Text: Human-readable CLI output
//!
//! # Example
//!
//! ```rust,no_run
//! use tenantgraph::reporter::Reporter;
//! use tenantgraph::types::ReportFormat;
//! use tenantgraph::Config;
//!
//! # fn example(result: &tenantgraph::GraphResult) -> tenantgraph::Result<()> {
//! let config = Config::default();
//! let reporter = Reporter::new(&config);
//!
//! let text = reporter.generate(result, ReportFormat::Text)?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

mod json;
mod text;

use crate::config::Config;
use crate::error::Result;
use crate::types::{GraphResult, ReportFormat};

pub use json::{JsonReport, JsonReporter};
pub use text::TextReporter;

/// Report generator that supports multiple output formats.
pub struct Reporter {
    config: Config,
}

impl Reporter {
    /// Create a new reporter with the given configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Generate a report in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if report generation fails.
    pub fn generate(&self, result: &GraphResult, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => JsonReporter::new(&self.config).generate(result),
            ReportFormat::Text => TextReporter::new(&self.config).generate(result),
        }
    }
}

/// Trait for report generators.
pub trait ReportGenerator {
    /// Generate a report from a pipeline result.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    fn generate(&self, result: &GraphResult) -> Result<String>;
}
