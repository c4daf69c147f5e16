use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

use chatexport::platform::Message;
use chatexport::{
    ArchiveRequest, ChatPlatform, Config, DiscordClient, HtmlTranscriptBuilder, TranscriptOptions,
    archive_ticket, export, link, quick_export, quick_link, raw_export, resolve_channel,
};

#[derive(Parser)]
#[command(
    name = "chatexport",
    version,
    about = "Export Discord channels to HTML transcripts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Guild (server) id
    #[arg(long)]
    guild: u64,
    /// Channel id
    #[arg(long)]
    channel: u64,
}

#[derive(Args)]
struct RenderArgs {
    /// Timezone for timestamps: UTC, a zone like Europe/London or an offset like +02:00 (default from config)
    #[arg(long)]
    tz: Option<String>,
    /// Use a 12-hour clock
    #[arg(long)]
    twelve_hour: bool,
    /// Plain timestamps without relative labels
    #[arg(long)]
    no_fancy_times: bool,
    /// Leave the credit line out of the footer
    #[arg(long)]
    no_credit: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Channel(ChannelCommand),

    /// View or modify config (~/.chatexport/config.toml)
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

/// Commands that talk to Discord.
#[derive(Subcommand)]
enum ChannelCommand {
    /// Write a transcript of the channel history to a file or stdout
    #[command(name = "export")]
    Export {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        render: RenderArgs,
        /// Maximum number of messages
        #[arg(long)]
        limit: Option<usize>,
        /// Only messages before this RFC 3339 time
        #[arg(long, value_parser = parse_datetime)]
        before: Option<OffsetDateTime>,
        /// Only messages after this RFC 3339 time
        #[arg(long, value_parser = parse_datetime)]
        after: Option<OffsetDateTime>,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render a hand-picked set of messages
    #[command(name = "raw-export")]
    RawExport {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        render: RenderArgs,
        /// Message ids to include
        #[arg(long = "message", required = true)]
        messages: Vec<u64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Post a transcript of the channel back into the channel
    #[command(name = "quick-export")]
    QuickExport {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        tz: Option<String>,
    },

    /// Save a ticket transcript to the output directory
    #[command(name = "archive")]
    Archive {
        #[command(flatten)]
        target: Target,
        /// Ticket id used in the file name
        #[arg(long)]
        ticket: String,
        /// Override the configured output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Print the viewer link for a posted transcript
    #[command(name = "link")]
    Link {
        #[command(flatten)]
        target: Target,
        /// Message carrying the transcript attachment
        #[arg(long)]
        message: u64,
    },

    /// Post the viewer link for a posted transcript
    #[command(name = "quick-link")]
    QuickLink {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        message: u64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current config
    Show,
    /// Set a config value
    Set {
        /// Key to set (token, api_base, output_dir, viewer_url, timezone, archive_limit, support_dev)
        key: String,
        /// Value to set
        value: String,
    },
    /// Reset config to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatexport=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_datetime(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|err| format!("expected RFC 3339 time: {err}"))
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config { action } => handle_config(action),
        Commands::Channel(command) => run_export(command),
    }
}

fn run_export(command: ChannelCommand) -> Result<()> {
    let config = Config::load()?;
    let token = config
        .resolve_token()
        .context("no bot token: set CHATEXPORT_TOKEN or run `chatexport config set token <token>`")?;
    let client = DiscordClient::new(config.api_base.clone(), token);

    match command {
        ChannelCommand::Export {
            target,
            render,
            limit,
            before,
            after,
            out,
        } => {
            let (guild, channel) = resolve_channel(&client, target.guild, target.channel)?;
            let options = TranscriptOptions {
                limit,
                before,
                after,
                ..render_options(&config, &render, TranscriptOptions::default())
            };
            let html = export(&client, &HtmlTranscriptBuilder, &guild, &channel, &options)?;
            emit(html, out)?;
        }
        ChannelCommand::RawExport {
            target,
            render,
            messages,
            out,
        } => {
            let (guild, channel) = resolve_channel(&client, target.guild, target.channel)?;
            let picked = messages
                .iter()
                .map(|id| fetch_message(&client, &channel, *id))
                .collect::<Result<Vec<_>>>()?;
            let options = render_options(&config, &render, TranscriptOptions::raw());
            let html = raw_export(
                &client,
                &HtmlTranscriptBuilder,
                &guild,
                &channel,
                picked,
                &options,
            )?;
            emit(html, out)?;
        }
        ChannelCommand::QuickExport { target, tz } => {
            let (guild, channel) = resolve_channel(&client, target.guild, target.channel)?;
            let options = TranscriptOptions {
                timezone: tz.unwrap_or_else(|| config.timezone.clone()),
                support_dev: config.support_dev,
                ..TranscriptOptions::default()
            };
            match quick_export(&client, &HtmlTranscriptBuilder, &guild, &channel, &options)? {
                Some(posted) => println!("{}", posted.id),
                None => eprintln!("#{} has no messages to export", channel.name),
            }
        }
        ChannelCommand::Archive {
            target,
            ticket,
            output_dir,
        } => {
            let mut export_config = config.export_config();
            if let Some(dir) = output_dir {
                export_config.output_dir = dir;
            }
            let request = ArchiveRequest {
                guild_id: target.guild,
                channel_id: target.channel,
                ticket_id: ticket,
                options: TranscriptOptions {
                    limit: Some(config.archive_limit),
                    timezone: config.timezone.clone(),
                    support_dev: config.support_dev,
                    ..TranscriptOptions::default()
                },
            };
            let path = archive_ticket(&client, &HtmlTranscriptBuilder, &request, &export_config)?;
            println!("{}", path.display());
        }
        ChannelCommand::Link { target, message } => {
            let (_, channel) = resolve_channel(&client, target.guild, target.channel)?;
            let posted = fetch_message(&client, &channel, message)?;
            println!("{}", link(&posted, &config.export_config())?);
        }
        ChannelCommand::QuickLink { target, message } => {
            let (_, channel) = resolve_channel(&client, target.guild, target.channel)?;
            let posted = fetch_message(&client, &channel, message)?;
            let sent = quick_link(&client, &channel, &posted, &config.export_config())?;
            println!("{}", sent.id);
        }
    }
    Ok(())
}

fn render_options(config: &Config, args: &RenderArgs, base: TranscriptOptions) -> TranscriptOptions {
    TranscriptOptions {
        timezone: args.tz.clone().unwrap_or_else(|| config.timezone.clone()),
        military_time: base.military_time && !args.twelve_hour,
        fancy_times: !args.no_fancy_times,
        support_dev: config.support_dev && !args.no_credit,
        ..base
    }
}

fn fetch_message(
    client: &dyn ChatPlatform,
    channel: &chatexport::platform::Channel,
    id: u64,
) -> Result<Message> {
    client
        .message(channel, id)
        .with_context(|| format!("failed to fetch message {id}"))?
        .with_context(|| format!("message {id} not found in #{}", channel.name))
}

fn emit(html: Option<String>, out: Option<PathBuf>) -> Result<()> {
    let Some(html) = html else {
        eprintln!("no messages to export");
        return Ok(());
    };
    match out {
        Some(path) => {
            std::fs::write(&path, html)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{html}"),
    }
    Ok(())
}

fn handle_config(action: Option<ConfigAction>) -> Result<()> {
    match action {
        None | Some(ConfigAction::Show) => {
            let config = Config::load()?;
            let token = if config.token.is_some() {
                "(set)"
            } else {
                "(unset)"
            };
            println!("token = {token}");
            println!("api_base = \"{}\"", config.api_base);
            println!("output_dir = \"{}\"", config.output_dir.display());
            println!("viewer_url = \"{}\"", config.viewer_url);
            println!("timezone = \"{}\"", config.timezone);
            println!("archive_limit = {}", config.archive_limit);
            println!("support_dev = {}", config.support_dev);
        }
        Some(ConfigAction::Set { key, value }) => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            let path = config.save()?;
            println!("saved to {}", path.display());
        }
        Some(ConfigAction::Reset { yes }) => {
            if !yes {
                use dialoguer::{Confirm, theme::ColorfulTheme};
                let confirm = Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt("Reset config to defaults? The saved token is discarded.")
                    .default(false)
                    .interact()?;
                if !confirm {
                    bail!("reset cancelled");
                }
            }
            let path = Config::default().save()?;
            println!("reset to defaults at {}", path.display());
        }
    }
    Ok(())
}
