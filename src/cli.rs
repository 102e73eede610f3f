//! Command-line interface definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::publish::Visibility;

#[derive(Debug, Parser)]
#[command(name = "clippost", version, about = "Publish videos through the private web upload API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload and publish a video using a stored session
    Upload(UploadArgs),
    /// Import a browser cookie export as a named session
    ImportSession(ImportSessionArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// Session identity to publish under
    #[arg(short, long)]
    pub identity: String,

    /// Path to the video file (already transcoded)
    #[arg(short, long)]
    pub video: PathBuf,

    /// Caption text; `#tag` and `@handle` tokens are resolved
    #[arg(short, long, default_value = "")]
    pub caption: String,

    /// Schedule offset in seconds from now (900 to 864000; 0 = publish now)
    #[arg(long, default_value_t = 0)]
    pub schedule: u64,

    #[arg(long, value_enum, default_value_t = VisibilityArg::Public)]
    pub visibility: VisibilityArg,

    /// Disable comments on the published video
    #[arg(long)]
    pub no_comment: bool,

    #[arg(long)]
    pub allow_duet: bool,

    #[arg(long)]
    pub allow_stitch: bool,

    /// AI-generated content label (0 = none)
    #[arg(long, default_value_t = 0)]
    pub ai_label: i64,

    /// Brand organic disclosure (0 = off)
    #[arg(long, default_value_t = 0)]
    pub brand_organic: i64,

    /// Branded content disclosure (0 = off)
    #[arg(long, default_value_t = 0)]
    pub branded_content: i64,

    /// Proxy URL for this job, overriding the configured default
    #[arg(long)]
    pub proxy: Option<String>,

    /// Datacenter override, replacing the one stored with the session
    #[arg(long)]
    pub datacenter: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportSessionArgs {
    /// Identity to store the session under
    #[arg(short, long)]
    pub identity: String,

    /// Path to a JSON cookie export (array of {name, value, ...})
    #[arg(short, long)]
    pub cookies: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VisibilityArg {
    Public,
    Private,
}

impl From<VisibilityArg> for Visibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Public => Visibility::Public,
            VisibilityArg::Private => Visibility::Private,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_upload_command() {
        let cli = Cli::parse_from([
            "clippost",
            "upload",
            "--identity",
            "creator1",
            "--video",
            "clip.mp4",
            "--caption",
            "hello #world",
            "--schedule",
            "3600",
            "--visibility",
            "public",
        ]);

        match cli.command {
            Commands::Upload(args) => {
                assert_eq!(args.identity, "creator1");
                assert_eq!(args.video, PathBuf::from("clip.mp4"));
                assert_eq!(args.schedule, 3600);
                assert!(!args.no_comment);
                assert!(!args.allow_duet);
            }
            _ => panic!("expected upload command"),
        }
    }

    #[test]
    fn parses_import_session_command() {
        let cli = Cli::parse_from([
            "clippost",
            "import-session",
            "--identity",
            "creator1",
            "--cookies",
            "export.json",
        ]);

        match cli.command {
            Commands::ImportSession(args) => {
                assert_eq!(args.identity, "creator1");
                assert_eq!(args.cookies, PathBuf::from("export.json"));
            }
            _ => panic!("expected import-session command"),
        }
    }
}
