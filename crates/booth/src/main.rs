//! `booth` - CLI for the confession booth
//!
//! This binary drives one booth session from the terminal: confess or deny,
//! talk it over, and browse the ledger.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use confession_booth::cli::{
    ChannelCommand, ChatCommand, Cli, Command, ConfessCommand, ConfigCommand, CrimesCommand,
    DenyCommand, OutputFormat, QuotaCommand,
};
use confession_booth::conversation::DEGRADED_STATUS;
use confession_booth::mirror::CHANNEL_METADATA_KEY;
use confession_booth::poster::WantedPoster;
use confession_booth::quota::OverrideRequest;
use confession_booth::record::photo_data_url;
use confession_booth::responder::TextProvider;
use confession_booth::session::{Event, Session};
use confession_booth::{
    init_logging, Booth, ConfessionForm, Config, Conversation, LedgerEntry, OverridePrompt,
    Storage, SubmissionOutcome,
};

/// Command typed to end a conversation.
const END_CHAT: &str = "/done";

/// Reads the override secret from the terminal.
#[derive(Debug)]
struct StdinPrompt;

impl OverridePrompt for StdinPrompt {
    fn request_override(&self, request: &OverrideRequest) -> Option<String> {
        println!("{}", request.message());
        read_line("> ").ok().flatten().filter(|s| !s.is_empty())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    // Execute the command
    match cli.command {
        Command::Confess(cmd) => handle_confess(&config, cmd).await,
        Command::Deny(cmd) => handle_deny(&config, &cmd).await,
        Command::Chat(cmd) => handle_chat(&config, &cmd).await,
        Command::Crimes(cmd) => handle_crimes(&config, &cmd).await,
        Command::Quota(cmd) => handle_quota(&config, &cmd).await,
        Command::Channel(cmd) => handle_channel(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

/// Read one trimmed line. `None` on end of input.
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn field_or_ask(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => Ok(read_line(&format!("{label}: "))?.unwrap_or_default()),
    }
}

fn read_photo(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read photo {}", path.display()))?;
    Ok(photo_data_url(&bytes))
}

async fn converse<P: TextProvider>(
    booth: &Booth<P>,
    conversation: &mut Conversation,
) -> Result<()> {
    println!("{}", conversation.display(&conversation.transcript()[0]));
    println!("(type {END_CHAT} to finish)");

    while let Some(line) = read_line("> ")? {
        if line == END_CHAT {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let reply = booth.chat(conversation, &line).await?;
        if reply.degraded {
            eprintln!("{DEGRADED_STATUS}");
        }
        if let Some(last) = conversation.transcript().last() {
            println!("{}", conversation.display(last));
        }
    }
    Ok(())
}

async fn handle_confess(config: &Config, cmd: ConfessCommand) -> Result<()> {
    let booth = Booth::from_config(config)?;
    let mut session = Session::new();
    session.apply(Event::Confess)?;

    let photo = match &cmd.photo {
        Some(path) => Some(read_photo(path)?),
        None => None,
    };
    let form = ConfessionForm {
        name: field_or_ask(cmd.name, "Full name")?,
        address: field_or_ask(cmd.address, "Address")?,
        crime: field_or_ask(cmd.crime, "Crime")?,
        photo,
    };

    let outcome = booth
        .submit_confession(form, &StdinPrompt)
        .await
        .map_err(|e| {
            if e.is_validation() {
                anyhow::anyhow!("{e}")
            } else if e.is_storage() {
                anyhow::Error::new(e).context("❌ Your confession was not recorded")
            } else {
                anyhow::Error::new(e)
            }
        })?;

    let record = match outcome {
        SubmissionOutcome::Accepted(record) => record,
        SubmissionOutcome::Denied(reason) => {
            session.apply(Event::Rejected)?;
            println!("{reason}");
            return Ok(());
        }
    };
    session.apply(Event::Submitted)?;
    println!("✓ Confession received and uploaded to records!");
    println!();

    let poster = WantedPoster::new(&record.report);
    println!("{}", poster.render());
    let dir = cmd.poster_dir.unwrap_or_else(|| Path::new(".").to_path_buf());
    match poster.save(&dir, Utc::now()) {
        Ok(path) => println!("💾 Poster saved to {}", path.display()),
        Err(e) => eprintln!("Poster not saved: {e}"),
    }
    session.apply(Event::PosterClosed)?;

    if cmd.no_chat {
        return Ok(());
    }

    let answer = read_line("Do you want a legal representative? [Y/n] ")?.unwrap_or_default();
    session.apply(Event::Consent(!answer.eq_ignore_ascii_case("n")))?;

    let mut counsel = booth.legal_counsel();
    converse(&booth, &mut counsel).await?;
    session.apply(Event::ChatClosed)?;

    booth
        .attach_transcript(&record, counsel.into_transcript())
        .await
        .context("❌ The transcript was not recorded")?;
    println!("✓ Complete confession filed.");
    Ok(())
}

async fn handle_deny(config: &Config, cmd: &DenyCommand) -> Result<()> {
    let booth = Booth::from_config(config)?;
    let mut session = Session::new();
    session.apply(Event::Deny)?;

    println!("Recording your denial...");
    let mut interrogation = booth.record_denial().await;
    if !cmd.no_chat {
        converse(&booth, &mut interrogation).await?;
    }
    session.apply(Event::ChatClosed)?;
    Ok(())
}

async fn handle_chat(config: &Config, cmd: &ChatCommand) -> Result<()> {
    let booth = Booth::from_config(config)?;
    let mut conversation = Conversation::new(cmd.persona.into());
    converse(&booth, &mut conversation).await
}

async fn handle_crimes(config: &Config, cmd: &CrimesCommand) -> Result<()> {
    let booth = Booth::from_config(config)?;
    let entries = if cmd.local_only {
        booth
            .ledger()
            .local()?
            .into_iter()
            .map(LedgerEntry::Local)
            .collect()
    } else {
        booth.crimes().await?
    };

    match cmd.format {
        OutputFormat::Json => {
            let rows: Vec<_> = entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "source": if entry.is_remote() { "remote" } else { "local" },
                        "title": entry.title(),
                        "fields": entry.fields(),
                        "timestamp": entry.timestamp(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Plain => {
            if entries.is_empty() {
                println!("No crimes reported yet.");
            }
            for entry in &entries {
                println!("{}  [{}]", entry.title(), entry.timestamp());
                for field in entry.fields() {
                    println!("  {}: {}", field.name, field.value);
                }
                println!();
            }
            let stats = confession_booth::storage::lock(booth.storage())?.stats()?;
            println!(
                "{} local records from {} identities ({} bytes)",
                stats.submissions, stats.identities, stats.db_size_bytes
            );
        }
    }
    Ok(())
}

async fn handle_quota(config: &Config, cmd: &QuotaCommand) -> Result<()> {
    let booth = Booth::from_config(config)?;
    let (identity, status) = booth.quota_status().await?;

    if cmd.json {
        let out = serde_json::json!({
            "identity": identity,
            "used_today": status.used_today,
            "unlocked": status.unlocked,
            "limit": status.limit,
            "remaining": status.remaining(),
            "normal_limit": booth.limiter().normal_limit(),
            "max_limit": booth.limiter().max_limit(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Identity:   {identity}");
        println!("Used today: {}", status.used_today);
        println!("Limit:      {}", status.limit);
        println!("Remaining:  {}", status.remaining());
        println!("Unlocked:   {}", status.unlocked);
    }
    Ok(())
}

fn handle_channel(config: &Config, cmd: &ChannelCommand) -> Result<()> {
    let storage = Storage::open(config.database_path())?;
    match cmd {
        ChannelCommand::Show => match storage.metadata(CHANNEL_METADATA_KEY)? {
            Some(id) => println!("{id}"),
            None => println!("No police channel set."),
        },
        ChannelCommand::Set { id } => {
            storage.set_metadata(CHANNEL_METADATA_KEY, id.trim())?;
            println!("Police channel set to {}", id.trim());
        }
        ChannelCommand::Clear => {
            if storage.clear_metadata(CHANNEL_METADATA_KEY)? {
                println!("Police channel cleared.");
            } else {
                println!("No police channel was set.");
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&config.redacted())?);
            } else {
                let set = |value: Option<&String>| {
                    if confession_booth::config::configured(value).is_some() {
                        "set"
                    } else {
                        "not set"
                    }
                };
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[App]");
                println!("  Name:               {}", config.app.name);
                println!("  Department:         {}", config.app.department);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Quota]");
                println!("  Normal limit:       {}", config.quota.normal_limit);
                println!("  Max limit:          {}", config.quota.max_limit);
                println!(
                    "  Override secret:    {}",
                    set(config.quota.override_secret.as_ref())
                );
                println!();
                println!("[Responder]");
                println!("  Model:              {}", config.responder.model);
                println!("  API keys:           {}", config.api_keys().len());
                println!();
                println!("[Notify]");
                println!(
                    "  Webhook:            {}",
                    set(config.notify.webhook_url.as_ref())
                );
                println!();
                println!("[Mirror]");
                println!(
                    "  GitHub token:       {}",
                    set(config.mirror.github_token.as_ref())
                );
                println!(
                    "  Discord bot token:  {}",
                    set(config.mirror.discord_bot_token.as_ref())
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
