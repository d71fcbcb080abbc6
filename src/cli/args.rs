//! Command-line argument parsing for ragline

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ragline - multi-tenant retrieval-augmented generation
#[derive(Parser, Debug)]
#[command(name = "ragline")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Index documents per tenant and answer questions over them", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.ragline/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -v (debug), -vv (trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print pipeline statistics after the command
    #[arg(long, global = true)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and store a document
    Index {
        /// Tenant the document belongs to
        #[arg(short, long)]
        tenant: String,

        /// Document id (default: file name)
        #[arg(short, long)]
        document: Option<String>,

        /// Text file to index; reads stdin when omitted
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Delete existing chunks of the document first
        #[arg(long)]
        replace: bool,
    },

    /// Remove every chunk of a document
    Delete {
        /// Document id
        document: String,
    },

    /// Print ranked snippets without synthesis
    Search {
        #[arg(short, long)]
        tenant: String,

        /// Number of results (default: retrieval.top_k)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        query: String,
    },

    /// Answer a question from the tenant's documents
    Ask {
        #[arg(short, long)]
        tenant: String,

        /// Stream tokens as they are generated
        #[arg(long)]
        stream: bool,

        /// Also print the chunks the answer was built from
        #[arg(long)]
        sources: bool,

        question: String,
    },

    /// Run health checks against every configured backend
    Doctor,

    /// Display or initialise configuration
    Config {
        /// Write the effective configuration to the config path
        #[arg(long)]
        init: bool,
    },
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Log level that overrides the configured one, if any
    pub fn log_level(&self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet => Some("error"),
            Verbosity::Normal => None,
            Verbosity::Verbose => Some("debug"),
            Verbosity::VeryVerbose => Some("trace"),
        }
    }

    /// Check if should show spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}
