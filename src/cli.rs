use clap::{Parser, Subcommand, ValueEnum};
use openwith::registry::Category;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "openwith")]
#[command(about = "Inspect and change which application opens each document type", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides OPENWITH_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List document types and URL schemes
    Types(TypesArgs),
    /// List document-capable applications
    Apps(AppsArgs),
    /// Show one type with its handlers
    Show {
        /// Type key, e.g. `public.png` or `url.scheme.mailto`
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one application and the types it handles
    App {
        /// Bundle identifier
        identifier: String,
        #[arg(long)]
        json: bool,
    },
    /// Make an application the default for a type
    SetDefault { identifier: String, key: String },
    /// Make an application the default for every type it supports
    SetDefaultAll { identifier: String },
    /// Re-read the current default for one type
    Refresh { key: String },
    /// Resolve the type of a file and its handlers
    Resolve {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Remove the default for a type (not supported by the system)
    ClearDefault { key: String },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct TypesArgs {
    #[arg(long, value_enum)]
    pub category: Option<CategoryArg>,
    /// Case-insensitive match on name, key, extension or default application
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug)]
pub struct AppsArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum CategoryArg {
    Document,
    Image,
    Audio,
    Video,
    Archive,
    SourceCode,
    UrlScheme,
    Other,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Document => Category::Document,
            CategoryArg::Image => Category::Image,
            CategoryArg::Audio => Category::Audio,
            CategoryArg::Video => Category::Video,
            CategoryArg::Archive => Category::Archive,
            CategoryArg::SourceCode => Category::SourceCode,
            CategoryArg::UrlScheme => Category::UrlScheme,
            CategoryArg::Other => Category::Other,
        }
    }
}
