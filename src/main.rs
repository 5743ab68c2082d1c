use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use vitrine::app::{AppConfig, VitrineApp};
use vitrine::assets::{AssetFetcher, FetchConfig, LoadedModel};
use vitrine::bookmarks::read_bookmarks_file;
use vitrine::session::ViewerSession;
use vitrine::settings::ViewerSettings;

/// Interactive 3D model viewer
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Model files or URLs (obj, gltf, glb, stl, fbx)
    models: Vec<String>,

    /// Viewer settings as JSON
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Start in tour mode
    #[arg(long)]
    tour: bool,

    /// Eye height used by tour mode
    #[arg(long)]
    tour_height: Option<f32>,

    /// Slowly rotate around the model while idle
    #[arg(long)]
    auto_rotate: bool,

    /// Bookmark list imported at start; `E` exports back to it
    #[arg(long)]
    bookmarks: Option<PathBuf>,

    /// Proxy endpoint remote models and images are fetched through
    #[arg(long)]
    proxy: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut settings = match &cli.settings {
        Some(path) => ViewerSettings::from_json_file(path)
            .with_context(|| format!("reading settings from {}", path.display()))?,
        None => ViewerSettings::default(),
    };
    settings.tour_mode |= cli.tour;
    settings.auto_rotate |= cli.auto_rotate;
    if let Some(height) = cli.tour_height {
        settings.tour_height = height;
    }

    let mut session = ViewerSession::new();
    if let Some(path) = cli.bookmarks.as_ref().filter(|p| p.exists()) {
        session.bookmarks = read_bookmarks_file(path)
            .with_context(|| format!("importing bookmarks from {}", path.display()))?;
        log::info!("Imported {} bookmarks", session.bookmarks.len());
    }

    let models = cli
        .models
        .iter()
        .filter_map(|locator| {
            let model = LoadedModel::from_locator(locator);
            if model.is_none() {
                log::warn!("Skipping {}: unknown model format", locator);
            }
            model
        })
        .collect();

    let fetcher = AssetFetcher::new(FetchConfig {
        proxy: cli.proxy,
        ..Default::default()
    });

    let app = VitrineApp::new(AppConfig {
        settings,
        session,
        models,
        bookmarks_path: cli.bookmarks,
        fetcher,
    })?;
    let session = app.run()?;
    log::info!("Session ended with {} bookmarks", session.bookmarks.len());
    Ok(())
}
