use std::sync::Arc;

use anyhow::bail;
use clap::Parser;
use homedir::my_home;

mod app;
mod board;
mod cli;
mod config;
mod eid;
mod metadata;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::App;
use board::Bookmark;
use config::Config;
use inquire::error::InquireResult;
use metadata::Resolver;
use storage::BackendLocal;
use tokio_util::sync::CancellationToken;

fn base_path() -> String {
    std::env::var("TABDECK_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/tabdeck",
        my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ))
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = cli::Args::parse();

    let base_path = base_path();
    let mut config = Config::load_with(&base_path)?;
    if !matches!(args.command, cli::Command::Daemon {}) {
        // one-shot commands exit before a detached backfill could land
        config.background_refresh = false;
    }

    let storage = Arc::new(BackendLocal::new(&base_path)?);
    let resolver = Arc::new(Resolver::new());
    let app = App::load(storage, resolver, config)?;

    match args.command {
        cli::Command::Daemon {} => {
            web::start_daemon(app);
            Ok(())
        }

        cli::Command::Resolve { url } => {
            let resolver = app.resolver();
            let meta = runtime()?
                .block_on(async { resolver.resolve(&url, &CancellationToken::new()).await });
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }

        cli::Command::Add {
            url,
            title,
            icon,
            group,
            white_bg,
        } => {
            let bookmark = Bookmark {
                url,
                title: title.unwrap_or_default(),
                icon: icon.unwrap_or_default(),
                white_bg,
            };
            let stored = runtime()?.block_on(app.add_bookmark(&group, bookmark))?;
            println!("{}", serde_json::to_string_pretty(&stored)?);
            Ok(())
        }

        cli::Command::List {} => {
            println!("{}", serde_json::to_string_pretty(&app.board())?);
            Ok(())
        }

        cli::Command::Import { file } => {
            let raw = std::fs::read(&file)?;
            let value: serde_json::Value = serde_json::from_slice(&raw)?;
            app.import(value)?;

            let board = app.board();
            println!(
                "imported {} bookmarks in {} groups",
                board.total_bookmarks(),
                board.group_order.len()
            );
            Ok(())
        }

        cli::Command::Export { output } => {
            let (filename, payload) = app.export();
            let path = output.unwrap_or(filename);
            let total: usize = payload.bookmarks.values().map(|items| items.len()).sum();

            std::fs::write(&path, serde_json::to_vec_pretty(&payload)?)?;
            println!("exported {total} bookmarks to {path}");
            Ok(())
        }

        cli::Command::Clear { yes } => {
            if !yes {
                match inquire::prompt_confirmation(
                    "You are about to wipe your entire board. Are you really sure?",
                ) {
                    InquireResult::Ok(true) => {}
                    InquireResult::Ok(false) => return Ok(()),
                    InquireResult::Err(err) => bail!("An error occurred: {}", err),
                }
            }
            app.clear()?;
            println!("board cleared");
            Ok(())
        }
    }
}
