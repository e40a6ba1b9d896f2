//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::conversation::Persona;

/// Confess command arguments.
#[derive(Debug, Args)]
pub struct ConfessCommand {
    /// Your full name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Your address
    #[arg(short, long)]
    pub address: Option<String>,

    /// What you did
    #[arg(long)]
    pub crime: Option<String>,

    /// JPEG photo of yourself
    #[arg(short, long, value_name = "FILE")]
    pub photo: Option<PathBuf>,

    /// Directory to save the wanted poster photo in
    #[arg(long, value_name = "DIR")]
    pub poster_dir: Option<PathBuf>,

    /// Skip the conversation with the legal representative
    #[arg(long)]
    pub no_chat: bool,
}

/// Deny command arguments.
#[derive(Debug, Args)]
pub struct DenyCommand {
    /// Record the denial without questioning
    #[arg(long)]
    pub no_chat: bool,
}

/// Chat command arguments.
#[derive(Debug, Args)]
pub struct ChatCommand {
    /// Who to talk to
    #[arg(short, long, value_enum, default_value = "legal-rep")]
    pub persona: PersonaArg,
}

/// Crimes command arguments.
#[derive(Debug, Args)]
pub struct CrimesCommand {
    /// Only show records stored on this device
    #[arg(long)]
    pub local_only: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Quota command arguments.
#[derive(Debug, Args)]
pub struct QuotaCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Police channel commands.
#[derive(Debug, Subcommand)]
pub enum ChannelCommand {
    /// Show the channel crimes are read back from
    Show,

    /// Set the channel crimes are read back from
    Set {
        /// Channel id
        id: String,
    },

    /// Stop reading crimes back
    Clear,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Persona argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PersonaArg {
    /// The interrogating officer
    Officer,
    /// The legal representative
    LegalRep,
}

impl From<PersonaArg> for Persona {
    fn from(arg: PersonaArg) -> Self {
        match arg {
            PersonaArg::Officer => Self::Officer,
            PersonaArg::LegalRep => Self::LegalRep,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_arg_conversion() {
        assert_eq!(Persona::from(PersonaArg::Officer), Persona::Officer);
        assert_eq!(Persona::from(PersonaArg::LegalRep), Persona::LegalRep);
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Plain);
    }

    #[test]
    fn test_confess_command_debug() {
        let cmd = ConfessCommand {
            name: Some("Pat".to_string()),
            address: None,
            crime: None,
            photo: None,
            poster_dir: None,
            no_chat: true,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Pat"));
        assert!(debug_str.contains("no_chat"));
    }

    #[test]
    fn test_channel_command_debug() {
        let cmd = ChannelCommand::Set {
            id: "123".to_string(),
        };
        assert!(format!("{cmd:?}").contains("123"));
    }
}
