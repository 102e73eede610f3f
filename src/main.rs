use clap::Parser;
use clippost::cli::{Cli, Commands, ImportSessionArgs, UploadArgs};
use clippost::config::Config;
use clippost::publish::{PublishHooks, Publisher, UploadJob};
use clippost::session::{SessionCookie, SessionStore};
use clippost::signer::NodeSigner;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

type MainError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), MainError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Upload(args) => upload(config, args).await?,
        Commands::ImportSession(args) => import_session(config, args)?,
    }

    Ok(())
}

async fn upload(config: Config, args: UploadArgs) -> Result<(), MainError> {
    let store = SessionStore::open(&config.session.store_dir);
    let session = store.load(&args.identity)?;

    let video = tokio::fs::read(&args.video).await.map_err(|e| {
        format!("failed to read video file {}: {e}", args.video.display())
    })?;

    let job = UploadJob::builder()
        .video(video)
        .caption(args.caption)
        .schedule_offset_secs(args.schedule)
        .allow_comment(!args.no_comment)
        .allow_duet(args.allow_duet)
        .allow_stitch(args.allow_stitch)
        .visibility(args.visibility.into())
        .ai_label(args.ai_label)
        .brand_organic_type(args.brand_organic)
        .branded_content_type(args.branded_content)
        .maybe_proxy(args.proxy)
        .maybe_datacenter(args.datacenter)
        .build();

    let signer = NodeSigner::new(
        config.signer.node_binary.clone(),
        config.signer.script.clone(),
        Duration::from_secs(config.signer.timeout_secs),
    );
    let publisher = Publisher::new(config, Arc::new(signer));

    let hooks = PublishHooks::new().with_status(|message| println!("{message}"));
    publisher.publish(&session, &job, hooks).await?;

    Ok(())
}

fn import_session(config: Config, args: ImportSessionArgs) -> Result<(), MainError> {
    let raw = std::fs::read_to_string(&args.cookies).map_err(|e| {
        format!("failed to read cookie export {}: {e}", args.cookies.display())
    })?;
    let cookies: Vec<SessionCookie> = serde_json::from_str(&raw)?;

    let store = SessionStore::open(&config.session.store_dir);
    let session = store.import(&args.identity, cookies)?;

    info!(
        identity = %session.identity,
        datacenter = session.datacenter_id.as_deref().unwrap_or("<none>"),
        "Session imported"
    );
    println!("Imported session for '{}'", session.identity);

    Ok(())
}
