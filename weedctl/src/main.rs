use clap::Parser;
use tokio_util::sync::CancellationToken;
use weedctl::config::{Args, Command};
use weedctl::console::{Console, save_downloads};
use weedctl::http::ReqwestHttpClient;
use weedctl::notifications::NotificationListener;
use weedctl::page::{Page, SharedPage};
use weedctl::registration::{RegistrationForm, RegistrationOutcome};
use weedctl::task::RedirectOutcome;
use weedctl::upload::{ArchiveUploadForm, CoordinateUploadForm, Corners, SelectedFile};
use weedctl::{Client, Config, telemetry};

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling...");
            token.cancel();
        }
    });
}

async fn selected(path: Option<&std::path::Path>) -> anyhow::Result<Vec<SelectedFile>> {
    match path {
        Some(path) => Ok(vec![SelectedFile::open(path).await?]),
        None => Ok(Vec::new()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry()?;
    tracing::debug!("{:?}", args);

    let Some(command) = args.command else {
        anyhow::bail!("No command given; run with --help to see the available commands");
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let client = Client::new(ReqwestHttpClient::new(config.request_timeout)?, &config)?;

    match command {
        Command::Listen => {
            let console = Console::stdout(SharedPage::default());
            let exit = NotificationListener::new(config.push_channel_url.clone())
                .run(&console, cancel)
                .await?;
            tracing::info!(exit = ?exit, "Stopped listening");
        }
        Command::Upload { file } => {
            let console = Console::stdout(SharedPage::new(Page::new("/app")));
            let form = ArchiveUploadForm {
                files: selected(file.as_deref()).await?,
            };
            client.upload_archive(form, &console, &cancel).await?;
            for path in save_downloads(console.page(), &config.download_dir).await? {
                println!("Saved {}", path.display());
            }
        }
        Command::UploadImage {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
            image,
        } => {
            let console = Console::stdout(SharedPage::new(Page::new("/app")));
            let form = CoordinateUploadForm {
                corners: Corners {
                    top_left,
                    top_right,
                    bottom_right,
                    bottom_left,
                },
                images: selected(image.as_deref()).await?,
            };
            client.upload_with_coordinates(form, &console, &cancel).await?;
        }
        Command::Register {
            name,
            email,
            phone,
            address,
        } => {
            let console = Console::stdout(SharedPage::default());
            let form = RegistrationForm {
                name,
                email,
                phone,
                address,
            };
            match client.register(form, &console, &cancel).await? {
                RegistrationOutcome::Registered(redirect) => {
                    if redirect.run(&console).await == RedirectOutcome::Cancelled {
                        anyhow::bail!("Redirect cancelled");
                    }
                }
                RegistrationOutcome::Rejected { detail } => {
                    anyhow::bail!("Registration rejected: {detail}");
                }
            }
        }
    }

    Ok(())
}
