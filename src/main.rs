use clap::{Parser, Subcommand};
use log::debug;
use nifki::config;
use nifki::output;
use nifki::pipeline::BuildStatus;
use nifki::service::{PageOutcome, PageRequest, PageService, SaveRequest, UploadRequest};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "nifki")]
#[command(about = "Page store and build pipeline for a game-script wiki")]
#[command(long_about = "\
Page store and build pipeline for a game-script wiki

Every page is a small game: a script, a handful of properties, and any images
it uses. Saving a page writes it to the workspace and compiles it; the result
is either a playable artifact or the compiler's diagnostics.

Workspace structure:

  wiki/
  ├── nifki.toml                   # Workspace config (optional)
  ├── MyGame/                      # One directory per page
  │   ├── source.sss               # Game script
  │   ├── properties.txt           # name, width, height, msPerFrame, debug
  │   └── res/                     # Uploaded images (PNG or JPEG)
  │       ├── cat
  │       └── cat1
  └── nifki-out/                   # Build outputs
      ├── MyGame.jar               # Artifact of the last successful build
      └── Broken.err               # Diagnostics of the last failed build

Page names start with a letter, contain only letters and digits, are 3 to 20
characters long, and are not entirely capital letters.

Run 'nifki gen-config' to generate a documented nifki.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Workspace directory
    #[arg(long, default_value = "wiki", global = true)]
    workspace: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Editor fields for a save. Anything omitted keeps its stored value.
#[derive(clap::Args)]
struct SaveArgs {
    /// Page being edited
    page: String,
    /// Read the game script from this file ('-' for stdin)
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    width: Option<String>,
    #[arg(long)]
    height: Option<String>,
    /// Milliseconds per frame
    #[arg(long)]
    ms_per_frame: Option<String>,
    /// Display title
    #[arg(long)]
    title: Option<String>,
    /// Save under a different name
    #[arg(long)]
    new_name: Option<String>,
    /// Enable debug mode in the player
    #[arg(long)]
    debug: Option<bool>,
}

#[derive(Subcommand)]
enum Command {
    /// List pages and their build state
    List,
    /// Create an empty page
    Create { page: String },
    /// Save a page (optionally under a new name) and build it
    Save(SaveArgs),
    /// Attach an image to a page
    Upload { page: String, file: PathBuf },
    /// Show the build state of a page
    Status { page: String },
    /// Rebuild a page from its stored state
    Build { page: String },
    /// Show a page's properties, resources, and build state
    Show { page: String },
    /// Print a stock nifki.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let open = || {
        debug!("opening workspace {}", cli.workspace.display());
        PageService::open(&cli.workspace)
    };

    match cli.command {
        Command::List => {
            let service = open()?;
            let mut pages = Vec::new();
            for name in service.pages().list()? {
                let status = service.status(&name)?;
                pages.push((name, status));
            }
            if cli.json {
                let entries: Vec<PageEntry<'_>> = pages
                    .iter()
                    .map(|(page, status)| PageEntry { page, status })
                    .collect();
                print_json(&entries)?;
            } else {
                output::print_page_list(&pages);
            }
        }
        Command::Create { page } => {
            let service = open()?;
            service.create(&page)?;
            println!("Created {page}");
        }
        Command::Save(args) => {
            let service = open()?;
            let request = save_request(&service, args)?;
            let outcome = service.handle(&PageRequest::Save(request))?;
            if cli.json {
                print_json(&outcome)?;
            } else if let PageOutcome::Saved(saved) = &outcome {
                output::print_save_outcome(saved);
            }
        }
        Command::Upload { page, file } => {
            let service = open()?;
            let request = UploadRequest {
                filename: file_name(&file),
                bytes: std::fs::read(&file)?,
                page,
            };
            let outcome = service.handle(&PageRequest::Upload(request))?;
            if cli.json {
                print_json(&outcome)?;
            } else if let PageOutcome::Uploaded { page, resource } = &outcome {
                output::print_upload(page, resource);
            }
        }
        Command::Status { page } => {
            let service = open()?;
            let status = service.status(&page)?;
            if cli.json {
                print_json(&PageEntry {
                    page: &page,
                    status: &status,
                })?;
            } else {
                output::print_status(&page, &status);
            }
        }
        Command::Build { page } => {
            let service = open()?;
            let status = service.rebuild(&page)?;
            if cli.json {
                print_json(&PageEntry {
                    page: &page,
                    status: &status,
                })?;
            } else {
                output::print_status(&page, &status);
            }
        }
        Command::Show { page } => {
            let service = open()?;
            let state = service.edit_state(&page)?;
            if cli.json {
                print_json(&state)?;
            } else {
                output::print_edit_state(&state);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct PageEntry<'a> {
    page: &'a str,
    status: &'a BuildStatus,
}

/// Console logging at a verbosity picked by `-v` count. `RUST_LOG` wins if set.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

fn print_json(value: &impl Serialize) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fill in the fields the user didn't pass from the page's stored state, so
/// `nifki save MyGame --width 320` changes only the width.
fn save_request(service: &PageService, args: SaveArgs) -> Result<SaveRequest, Box<dyn std::error::Error>> {
    let existing = service.pages().exists(&args.page);
    let stored_source = if existing {
        service.pages().read_source(&args.page)?
    } else {
        String::new()
    };
    let stored = if existing {
        service.pages().read_properties(&args.page)?
    } else {
        Default::default()
    };
    let settings = stored.settings().unwrap_or_default();

    let source = match args.source.as_deref() {
        Some(path) if path == Path::new("-") => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            text
        }
        Some(path) => std::fs::read_to_string(path)?,
        None => stored_source,
    };

    Ok(SaveRequest {
        new_name: args.new_name.unwrap_or_else(|| args.page.clone()),
        page: args.page,
        source,
        width: args.width.unwrap_or_else(|| settings.width.to_string()),
        height: args.height.unwrap_or_else(|| settings.height.to_string()),
        ms_per_frame: args
            .ms_per_frame
            .unwrap_or_else(|| settings.ms_per_frame.to_string()),
        title: args.title.unwrap_or(settings.name),
        debug: args.debug.unwrap_or(settings.debug),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
