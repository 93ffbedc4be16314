use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lexhook::chat::ConversationSession;
use lexhook::console::{self, UploadForm};
use lexhook::ingest::{Category, IngestSession, MetadataField};
use lexhook::settings::{SettingsError, SettingsOrigin, SettingsStore};
use lexhook_webhook::{TransportError, create_transport};
use snafu::{ResultExt, Snafu};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

/// Terminal client for the legal assistant and document ingestion webhooks.
#[derive(Debug, Parser)]
#[command(name = "lexhook", version, about)]
struct Cli {
    /// Settings file; defaults to the per-user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chat with the legal assistant. Type /quit to leave.
    Chat,
    /// Upload one document to the ingestion webhook.
    Upload(UploadArgs),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
struct UploadArgs {
    /// Document to upload (pdf, doc, docx, txt).
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,
    /// Raw document text, sent instead of a file.
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    category: Option<Category>,
    #[arg(long)]
    court: Option<String>,
    #[arg(long)]
    case_number: Option<String>,
    #[arg(long)]
    date: Option<String>,
    /// Comma-separated tags.
    #[arg(long)]
    tags: Option<String>,
    #[arg(long)]
    description: Option<String>,
}

impl UploadArgs {
    fn into_form(self) -> UploadForm {
        let fields = [
            (MetadataField::Title, self.title),
            (MetadataField::Author, self.author),
            (MetadataField::Court, self.court),
            (MetadataField::CaseNumber, self.case_number),
            (MetadataField::Date, self.date),
            (MetadataField::Tags, self.tags),
            (MetadataField::Description, self.description),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|value| (field, value)))
        .collect();

        UploadForm {
            file: self.file,
            text: self.text,
            category: self.category,
            fields,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective settings as JSON.
    Show,
    /// Write the default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Snafu)]
enum AppError {
    #[snafu(display("failed to create webhook transport on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        source: TransportError,
    },
    #[snafu(display("console failed on `{stage}`: {source}"))]
    Console {
        stage: &'static str,
        source: console::ConsoleError,
    },
    #[snafu(display("failed to save settings on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to render settings on `{stage}`: {source}"))]
    RenderSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("settings file {path:?} already exists, pass --force to overwrite"))]
    SettingsExist { stage: &'static str, path: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{}", snafu::Report::from_error(error));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut store = match cli.config {
        Some(path) => SettingsStore::open(path),
        None => SettingsStore::open_default(),
    };
    let settings = store.settings().clone();

    match cli.command {
        Command::Chat => {
            let transport = create_transport(settings.transport.to_transport_config())
                .context(TransportSnafu {
                    stage: "create-chat-transport",
                })?;
            let session = Arc::new(ConversationSession::new(settings.chat, transport));
            let input = BufReader::new(tokio::io::stdin());
            console::run_chat(session, input, tokio::io::stdout())
                .await
                .context(ConsoleSnafu { stage: "chat" })?;
        }
        Command::Upload(args) => {
            let transport = create_transport(settings.transport.to_transport_config())
                .context(TransportSnafu {
                    stage: "create-ingest-transport",
                })?;
            let session = IngestSession::new(settings.ingest, transport);
            let mut output = tokio::io::stdout();
            console::run_upload(&session, &args.into_form(), &mut output)
                .await
                .context(ConsoleSnafu { stage: "upload" })?;
        }
        Command::Config(ConfigCommand::Show) => {
            let origin = match store.origin() {
                SettingsOrigin::Defaults => "defaults",
                SettingsOrigin::File => "file",
                SettingsOrigin::InvalidFile => "defaults, settings file ignored",
            };
            tracing::info!(path = %store.path().display(), origin, "effective settings");
            let rendered = serde_json::to_string_pretty(&settings).context(RenderSettingsSnafu {
                stage: "render-settings-json",
            })?;
            println!("{rendered}");
        }
        Command::Config(ConfigCommand::Init { force }) => {
            let path = store.path().to_path_buf();
            snafu::ensure!(
                force || !path.exists(),
                SettingsExistSnafu {
                    stage: "check-existing-settings",
                    path,
                }
            );
            store.save(settings).context(SettingsSnafu {
                stage: "write-default-settings",
            })?;
            println!("wrote {}", store.path().display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_args_become_form_fields() {
        let cli = Cli::parse_from([
            "lexhook",
            "upload",
            "--text",
            "Opinion body",
            "--title",
            "Smith v. Jones",
            "--category",
            "case law",
            "--tags",
            "tort, negligence",
        ]);

        let Command::Upload(args) = cli.command else {
            panic!("expected upload command");
        };
        let form = args.into_form();
        assert_eq!(form.text.as_deref(), Some("Opinion body"));
        assert_eq!(form.category, Some(Category::CaseLaw));
        assert_eq!(
            form.fields,
            vec![
                (MetadataField::Title, "Smith v. Jones".to_string()),
                (MetadataField::Tags, "tort, negligence".to_string()),
            ]
        );
    }

    #[test]
    fn file_and_text_conflict() {
        let result = Cli::try_parse_from([
            "lexhook", "upload", "--file", "a.pdf", "--text", "body",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn config_path_is_global() {
        let cli = Cli::parse_from(["lexhook", "config", "show", "--config", "/tmp/lexhook.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/lexhook.json")));
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Show)));
    }
}
