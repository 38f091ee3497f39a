use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use xfetcher::config::{ConfigLoader, ResolvedConfig};
use xfetcher::error::FetchError;
use xfetcher::fs_util;
use xfetcher::output::{
    DownloadResult, ExtractResult, FetchResult, JsonOutput, ListResult, OutputMode,
    print_manifest,
};
use xfetcher::progress::{Confirm, FixedAnswer, StdinConfirm};
use xfetcher::session::DownloadSession;
use xfetcher::transport::ReqwestTransport;
use xfetcher::tui::{Operation, Tui};

#[derive(Parser)]
#[command(name = "xfetch")]
#[command(about = "Download a ZIP archive and safely extract it, nested archives included")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Answer yes to the large-download confirmation.
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    save_dir: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    keep_archives: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download an archive and extract it")]
    Get(GetArgs),
    #[command(about = "Download a file without extracting it")]
    Download(DownloadArgs),
    #[command(about = "Extract a local archive")]
    Extract(ExtractArgs),
    #[command(about = "List files under a directory (default: save dir)")]
    List(ListArgs),
}

#[derive(Args)]
struct GetArgs {
    url: String,

    #[arg(long)]
    dest: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct DownloadArgs {
    url: String,

    #[arg(long)]
    filename: Option<String>,

    #[arg(long)]
    chunk_size: Option<usize>,
}

#[derive(Args)]
struct ExtractArgs {
    archive: Utf8PathBuf,

    #[arg(long)]
    dest: Option<Utf8PathBuf>,
}

#[derive(Args)]
struct ListArgs {
    dir: Option<Utf8PathBuf>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<FetchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FetchError) -> u8 {
    match error.root_cause() {
        FetchError::InvalidInput(_)
        | FetchError::ParseFailure(_)
        | FetchError::ConfigRead(_)
        | FetchError::ConfigParse(_)
        | FetchError::NotFound(_) => 2,
        FetchError::ConnectionFailure { .. }
        | FetchError::Timeout { .. }
        | FetchError::TransferFailure { .. } => 3,
        FetchError::InvalidArchive(_)
        | FetchError::UnsafePath { .. }
        | FetchError::NestingTooDeep { .. } => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(save_dir) = cli.save_dir {
        config.save_dir = save_dir;
    }
    if cli.keep_archives {
        config.session.keep_archives = true;
    }

    match cli.command {
        Commands::Get(args) => run_get(args, &config, output_mode, cli.yes),
        Commands::Download(args) => {
            // A bare download is the deliverable, so it must outlive the session.
            config.session.keep_archives = true;
            run_download(args, &config, output_mode, cli.yes)
        }
        Commands::Extract(args) => run_extract(args, &config, output_mode),
        Commands::List(args) => run_list(args, &config, output_mode),
    }
}

fn open_session(config: &ResolvedConfig) -> Result<DownloadSession<ReqwestTransport>, FetchError> {
    let transport = ReqwestTransport::new(config.connect_timeout, config.read_timeout)?;
    DownloadSession::with_options(config.save_dir.clone(), config.session.clone(), transport)
}

fn run_get(
    args: GetArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
    assume_yes: bool,
) -> miette::Result<()> {
    let session = open_session(config)?;
    let GetArgs { url, dest } = args;

    let (extract_dir, files) = match output_mode {
        OutputMode::NonInteractive => {
            let confirm = stdin_or_yes(assume_yes);
            session
                .download_and_extract(&url, dest.as_deref(), &JsonOutput, confirm.as_ref())?
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(Operation::Fetch);
            tui.run(move |sink, confirm| {
                let yes = FixedAnswer(true);
                let confirm: &dyn Confirm = if assume_yes { &yes } else { confirm };
                session.download_and_extract(&url, dest.as_deref(), sink, confirm)
            })?
        }
    };

    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print_fetch(&FetchResult { extract_dir, files }).into_diagnostic()?
        }
        OutputMode::Interactive => {
            println!("Extracted to {extract_dir}");
            print_manifest("Extracted files", &files);
        }
    }
    Ok(())
}

fn run_download(
    args: DownloadArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
    assume_yes: bool,
) -> miette::Result<()> {
    let session = open_session(config)?;
    let DownloadArgs {
        url,
        filename,
        chunk_size,
    } = args;

    match output_mode {
        OutputMode::NonInteractive => {
            let confirm = stdin_or_yes(assume_yes);
            let path = session
                .download(
                    &url,
                    filename.as_deref(),
                    chunk_size,
                    &JsonOutput,
                    confirm.as_ref(),
                )?;
            let is_archive = fs_util::is_archive(&path);
            JsonOutput::print_download(&DownloadResult { path, is_archive }).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(Operation::Download);
            let path = tui.run(move |sink, confirm| {
                let yes = FixedAnswer(true);
                let confirm: &dyn Confirm = if assume_yes { &yes } else { confirm };
                session.download(&url, filename.as_deref(), chunk_size, sink, confirm)
            })?;
            if fs_util::is_archive(&path) {
                println!("Downloaded to {path} (ZIP archive)");
            } else {
                println!("Downloaded to {path} (not a ZIP archive)");
            }
        }
    }
    Ok(())
}

fn run_extract(
    args: ExtractArgs,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let session = open_session(config)?;
    let ExtractArgs { archive, dest } = args;

    match output_mode {
        OutputMode::NonInteractive => {
            let extract_dir = session.extract(&archive, dest.as_deref(), &JsonOutput)?;
            JsonOutput::print_extract(&ExtractResult { extract_dir }).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(Operation::Extract);
            let extract_dir = tui.run(move |sink, _confirm| {
                session.extract(&archive, dest.as_deref(), sink)
            })?;
            println!("Extracted to {extract_dir}");
        }
    }
    Ok(())
}

fn run_list(args: ListArgs, config: &ResolvedConfig, output_mode: OutputMode) -> miette::Result<()> {
    let session = open_session(config)?;
    let dir = args.dir.unwrap_or_else(|| session.root().to_path_buf());
    let files = session.list_contents(Some(&dir))?;

    match output_mode {
        OutputMode::NonInteractive => {
            JsonOutput::print_list(&ListResult { dir, files }).into_diagnostic()?
        }
        OutputMode::Interactive => print_manifest(&format!("Contents of {dir}"), &files),
    }
    Ok(())
}

fn stdin_or_yes(assume_yes: bool) -> Box<dyn Confirm> {
    if assume_yes {
        Box::new(FixedAnswer(true))
    } else {
        Box::new(StdinConfirm)
    }
}
