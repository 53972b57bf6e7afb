//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `build`: Build the architecture graph for a filtered resource snapshot
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Graph one resource group, resolving dependencies against the store
//! tenantgraph build resources.json --resource-group spoke-rg
//!
//! # Skip dependency collection and emit Mermaid
//! tenantgraph build resources.json --offline --format mermaid
//!
//! # Text report instead of a graph
//! tenantgraph build resources.json -g spoke-rg --report text
//!
//! # Initialize configuration
//! tenantgraph init
//!
//! # Validate configuration
//! tenantgraph validate tenantgraph.yaml
//! ```

use crate::types::{FilterDescription, GraphFormat, ReportFormat};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// TenantGraph - dependency-aware architecture graphs for cloud tenants.
#[derive(Parser, Debug)]
#[command(
    name = "tenantgraph",
    author,
    version,
    about = "Dependency-aware architecture graphs for filtered cloud tenant scans",
    long_about = "TenantGraph reads a snapshot of cloud resources, narrows it to a filter, \
                  resolves the resources the filtered set depends on from the graph store \
                  or the cloud API, and collapses the relationships into a type-level \
                  architecture graph."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "TENANTGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the architecture graph for a resource snapshot
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// Create an example configuration file
    Init,

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the build command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Resource snapshot (JSON array or `{"value": [...]}` of resource documents)
    #[arg(value_name = "SNAPSHOT")]
    pub input: PathBuf,

    /// Keep only resources in these resource groups
    #[arg(short = 'g', long = "resource-group", value_name = "NAME")]
    pub resource_groups: Vec<String>,

    /// Keep only resources of these provider types
    #[arg(short = 't', long = "resource-type", value_name = "TYPE")]
    pub resource_types: Vec<String>,

    /// Keep only resources carrying this tag
    #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,

    /// Skip dependency collection (no graph store or cloud API access)
    #[arg(long)]
    pub offline: bool,

    /// Output format for the graph
    #[arg(short, long, default_value = "dot", value_enum)]
    pub format: GraphFormat,

    /// Emit a report in this format instead of the graph
    #[arg(long, value_name = "FORMAT", value_enum)]
    pub report: Option<ReportFormat>,

    /// Output file path (stdout if not specified)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write the resources discovered during collection to this file
    #[arg(long, value_name = "FILE")]
    pub discovered: Option<PathBuf>,

    /// Maximum concurrent fetches against the cloud API
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Dependency resolution depth (1 resolves direct references only)
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Overall collection deadline in seconds
    #[arg(long = "deadline", value_name = "SECS")]
    pub deadline_secs: Option<u64>,

    /// Graph store HTTP endpoint
    #[arg(long, value_name = "URI", env = "TENANTGRAPH_NEO4J_URI")]
    pub neo4j_uri: Option<String>,
}

impl BuildArgs {
    /// The filter described by the selection flags.
    #[must_use]
    pub fn filter(&self) -> FilterDescription {
        FilterDescription {
            resource_groups: self.resource_groups.clone(),
            resource_types: self.resource_types.clone(),
            tags: self.tags.iter().cloned().collect(),
        }
    }
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(value_name = "FILE", default_value = "tenantgraph.yaml")]
    pub config: PathBuf,
}

fn parse_tag(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
