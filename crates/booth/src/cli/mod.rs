//! Command-line interface for the confession booth.
//!
//! This module provides the CLI structure and command handlers for the
//! `booth` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ChannelCommand, ChatCommand, ConfessCommand, ConfigCommand, CrimesCommand, DenyCommand,
    OutputFormat, PersonaArg, QuotaCommand,
};

/// booth - A terminal confession booth
///
/// Confess or deny, talk to the officer or your legal representative, and
/// browse the crime ledger.
#[derive(Debug, Parser)]
#[command(name = "booth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Confess to a crime
    Confess(ConfessCommand),

    /// Deny committing a crime
    Deny(DenyCommand),

    /// Talk to the officer or the legal representative
    Chat(ChatCommand),

    /// List reported crimes
    Crimes(CrimesCommand),

    /// Show today's confession quota
    Quota(QuotaCommand),

    /// Manage the police channel used for read-back
    #[command(subcommand)]
    Channel(ChannelCommand),

    /// View or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
