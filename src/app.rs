use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use tokio_util::sync::CancellationToken;

use crate::{
    board::{Board, BoardError, Bookmark, ExportPayload},
    config::Config,
    metadata::{self, ResolutionResult, Resolver},
    storage::StorageManager,
};

pub const BOARD_FILE: &str = "board.json";

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Board(#[from] BoardError),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("serialization error: {0:?}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

/// Owns the board state and pushes every mutation through the storage
/// backend. The board lock is synchronous and never held across an await.
pub struct App {
    board: RwLock<Board>,
    storage: Arc<dyn StorageManager>,
    resolver: Arc<Resolver>,
    config: Config,

    // bumped on import/clear so in-flight backfills drop stale results
    session: AtomicU64,
}

impl App {
    pub fn load(
        storage: Arc<dyn StorageManager>,
        resolver: Arc<Resolver>,
        config: Config,
    ) -> Result<Arc<Self>, AppError> {
        let mut board = if storage.exists(BOARD_FILE) {
            serde_json::from_slice::<Board>(&storage.read(BOARD_FILE)?)?
        } else {
            Board::default()
        };
        board.validate();

        log::info!(
            "loaded board: {} groups, {} bookmarks",
            board.group_order.len(),
            board.total_bookmarks()
        );

        Ok(Arc::new(Self {
            board: RwLock::new(board),
            storage,
            resolver,
            config,
            session: AtomicU64::new(0),
        }))
    }

    pub fn board(&self) -> Board {
        self.board.read().expect("board lock poisoned").clone()
    }

    pub fn resolver(&self) -> Arc<Resolver> {
        self.resolver.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Applies a mutation and persists the result. Serialization happens
    /// under the lock, the disk write after it is released.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Board) -> Result<T, BoardError>,
    ) -> Result<T, AppError> {
        let (out, bytes) = {
            let mut board = self.board.write().expect("board lock poisoned");
            let out = f(&mut board)?;
            (out, serde_json::to_vec_pretty(&*board)?)
        };
        self.storage.write(BOARD_FILE, &bytes)?;
        Ok(out)
    }

    pub async fn resolve_metadata(&self, url: &str) -> ResolutionResult {
        self.resolver.resolve(url, &CancellationToken::new()).await
    }

    /// Stores a bookmark, filling a missing title or icon through the
    /// resolver. With background refresh enabled the incomplete bookmark is
    /// saved as-is and a detached task patches it in later.
    pub async fn add_bookmark(
        self: &Arc<Self>,
        group: &str,
        mut bookmark: Bookmark,
    ) -> Result<Bookmark, AppError> {
        bookmark.url = metadata::ensure_scheme(&bookmark.url);
        let needs_meta = bookmark.title.is_empty() || bookmark.icon.is_empty();

        if needs_meta && !self.config.background_refresh {
            let resolved = self.resolve_metadata(&bookmark.url).await;
            apply_resolution(&mut bookmark, resolved);
        }

        self.mutate(|board| board.add_bookmark(group, bookmark.clone()))?;

        if needs_meta && self.config.background_refresh {
            self.spawn_backfill(group.to_string(), bookmark.url.clone());
        }
        Ok(bookmark)
    }

    pub async fn update_bookmark(
        &self,
        group: &str,
        index: usize,
        mut bookmark: Bookmark,
    ) -> Result<Bookmark, AppError> {
        bookmark.url = metadata::ensure_scheme(&bookmark.url);
        if bookmark.title.is_empty() || bookmark.icon.is_empty() {
            let resolved = self.resolve_metadata(&bookmark.url).await;
            apply_resolution(&mut bookmark, resolved);
        }
        self.mutate(|board| board.update_bookmark(group, index, bookmark.clone()))?;
        Ok(bookmark)
    }

    pub fn delete_bookmark(&self, group: &str, index: usize) -> Result<Bookmark, AppError> {
        self.mutate(|board| board.delete_bookmark(group, index))
    }

    pub fn move_bookmark(
        &self,
        from_group: &str,
        from_index: usize,
        to_group: &str,
        to_index: usize,
    ) -> Result<(), AppError> {
        self.mutate(|board| board.move_bookmark(from_group, from_index, to_group, to_index))
    }

    pub fn add_group(&self, name: &str) -> Result<(), AppError> {
        self.mutate(|board| board.add_group(name))
    }

    pub fn rename_group(&self, old: &str, new: &str) -> Result<(), AppError> {
        self.mutate(|board| board.rename_group(old, new))
    }

    pub fn delete_group(&self, name: &str) -> Result<(), AppError> {
        self.mutate(|board| board.delete_group(name))
    }

    pub fn move_group(&self, from: usize, to: usize) -> Result<(), AppError> {
        self.mutate(|board| board.move_group(from, to))
    }

    pub fn set_collapsed(&self, group: &str, collapsed: bool) -> Result<(), AppError> {
        self.mutate(|board| board.set_collapsed(group, collapsed))
    }

    pub fn import(&self, payload: serde_json::Value) -> Result<(), AppError> {
        self.session.fetch_add(1, Ordering::SeqCst);
        self.mutate(|board| board.import(payload))
    }

    pub fn export(&self) -> (String, ExportPayload) {
        let payload = self.board.read().expect("board lock poisoned").export();
        (Board::export_filename(chrono::Local::now()), payload)
    }

    pub fn clear(&self) -> Result<(), AppError> {
        self.session.fetch_add(1, Ordering::SeqCst);
        self.mutate(|board| {
            board.clear();
            Ok(())
        })
    }

    /// Resolves metadata off the request path and patches the bookmark's
    /// still-empty fields. The result is dropped if the board was replaced
    /// (session moved) or the bookmark no longer matches by url.
    fn spawn_backfill(self: &Arc<Self>, group: String, url: String) {
        let app = Arc::clone(self);
        let session = self.session.load(Ordering::SeqCst);
        tokio::spawn(async move {
            let resolved = app
                .resolver
                .resolve(&url, &CancellationToken::new())
                .await;
            if app.session.load(Ordering::SeqCst) != session {
                log::debug!("dropping stale metadata for {url}");
                return;
            }
            let outcome = app.mutate(|board| {
                if let Some(items) = board.bookmarks.get_mut(&group) {
                    for bookmark in items.iter_mut().filter(|b| b.url == url) {
                        if bookmark.title.is_empty() {
                            bookmark.title = resolved.title.clone();
                        }
                        if bookmark.icon.is_empty() {
                            bookmark.icon = resolved.icon.clone();
                        }
                    }
                }
                Ok(())
            });
            if let Err(err) = outcome {
                log::error!("metadata backfill for {url} failed to persist: {err}");
            }
        });
    }
}

fn apply_resolution(bookmark: &mut Bookmark, resolved: ResolutionResult) {
    if bookmark.title.is_empty() {
        bookmark.title = resolved.title;
    }
    if bookmark.icon.is_empty() {
        bookmark.icon = resolved.icon;
    }
}
