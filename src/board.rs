use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_GROUP: &str = "default";

/// Version tag of the export payload. Version 3 added `groupOrder` and
/// `collapsedGroups`; older files are still accepted by [`Board::import`].
pub const EXPORT_VERSION: u32 = 3;

#[derive(thiserror::Error, Debug)]
pub enum BoardError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("group already exists: {0}")]
    GroupExists(String),

    #[error("bookmark index {index} out of range for group {group}")]
    IndexOutOfRange { group: String, index: usize },

    #[error("invalid board payload: {0}")]
    InvalidPayload(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub title: String,
    pub icon: String,
    // `whiteBg` on the wire for compatibility with existing export files
    #[serde(rename = "whiteBg", default)]
    pub white_bg: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub bookmarks: HashMap<String, Vec<Bookmark>>,
    #[serde(rename = "groupOrder")]
    pub group_order: Vec<String>,
    #[serde(rename = "collapsedGroups", default)]
    pub collapsed_groups: Vec<String>,
}

/// Versioned wrapper written by export and produced for download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportPayload {
    // older exports predate the version tag
    #[serde(default)]
    pub version: u32,
    pub bookmarks: HashMap<String, Vec<Bookmark>>,
    #[serde(rename = "groupOrder")]
    pub group_order: Vec<String>,
    #[serde(rename = "collapsedGroups", default)]
    pub collapsed_groups: Vec<String>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            bookmarks: HashMap::from([(DEFAULT_GROUP.to_string(), Vec::new())]),
            group_order: vec![DEFAULT_GROUP.to_string()],
            collapsed_groups: Vec::new(),
        }
    }
}

impl Board {
    /// Repair structural drift: every group in the map appears in the order
    /// list and vice versa, and the collapsed set only names real groups.
    pub fn validate(&mut self) {
        for name in self.bookmarks.keys() {
            if !self.group_order.contains(name) {
                self.group_order.push(name.clone());
            }
        }
        for name in &self.group_order {
            self.bookmarks.entry(name.clone()).or_default();
        }
        self.collapsed_groups
            .retain(|name| self.bookmarks.contains_key(name));

        if self.group_order.is_empty() {
            *self = Board::default();
        }
    }

    fn group_mut(&mut self, group: &str) -> Result<&mut Vec<Bookmark>, BoardError> {
        self.bookmarks
            .get_mut(group)
            .ok_or_else(|| BoardError::GroupNotFound(group.to_string()))
    }

    pub fn add_group(&mut self, name: &str) -> Result<(), BoardError> {
        if self.bookmarks.contains_key(name) {
            return Err(BoardError::GroupExists(name.to_string()));
        }
        self.bookmarks.insert(name.to_string(), Vec::new());
        self.group_order.push(name.to_string());
        Ok(())
    }

    pub fn rename_group(&mut self, old: &str, new: &str) -> Result<(), BoardError> {
        if old == new {
            return Ok(());
        }
        if self.bookmarks.contains_key(new) {
            return Err(BoardError::GroupExists(new.to_string()));
        }
        let items = self
            .bookmarks
            .remove(old)
            .ok_or_else(|| BoardError::GroupNotFound(old.to_string()))?;
        self.bookmarks.insert(new.to_string(), items);
        if let Some(slot) = self.group_order.iter_mut().find(|name| name.as_str() == old) {
            *slot = new.to_string();
        }
        // collapsed state follows the rename
        for name in self.collapsed_groups.iter_mut() {
            if name == old {
                *name = new.to_string();
            }
        }
        Ok(())
    }

    pub fn delete_group(&mut self, name: &str) -> Result<(), BoardError> {
        if self.bookmarks.remove(name).is_none() {
            return Err(BoardError::GroupNotFound(name.to_string()));
        }
        self.group_order.retain(|g| g != name);
        self.collapsed_groups.retain(|g| g != name);
        if self.group_order.is_empty() {
            *self = Board::default();
        }
        Ok(())
    }

    pub fn move_group(&mut self, from: usize, to: usize) -> Result<(), BoardError> {
        if from >= self.group_order.len() || to >= self.group_order.len() {
            return Err(BoardError::IndexOutOfRange {
                group: String::new(),
                index: from.max(to),
            });
        }
        let moved = self.group_order.remove(from);
        self.group_order.insert(to, moved);
        Ok(())
    }

    pub fn set_collapsed(&mut self, group: &str, collapsed: bool) -> Result<(), BoardError> {
        if !self.bookmarks.contains_key(group) {
            return Err(BoardError::GroupNotFound(group.to_string()));
        }
        if collapsed {
            if !self.collapsed_groups.iter().any(|g| g == group) {
                self.collapsed_groups.push(group.to_string());
            }
        } else {
            self.collapsed_groups.retain(|g| g != group);
        }
        Ok(())
    }

    /// Appends and returns the new bookmark's index within the group.
    pub fn add_bookmark(&mut self, group: &str, bookmark: Bookmark) -> Result<usize, BoardError> {
        let items = self.group_mut(group)?;
        items.push(bookmark);
        Ok(items.len() - 1)
    }

    pub fn get_bookmark(&self, group: &str, index: usize) -> Result<&Bookmark, BoardError> {
        self.bookmarks
            .get(group)
            .ok_or_else(|| BoardError::GroupNotFound(group.to_string()))?
            .get(index)
            .ok_or_else(|| BoardError::IndexOutOfRange {
                group: group.to_string(),
                index,
            })
    }

    pub fn update_bookmark(
        &mut self,
        group: &str,
        index: usize,
        bookmark: Bookmark,
    ) -> Result<(), BoardError> {
        let group_name = group.to_string();
        let items = self.group_mut(group)?;
        let slot = items
            .get_mut(index)
            .ok_or(BoardError::IndexOutOfRange { group: group_name, index })?;
        *slot = bookmark;
        Ok(())
    }

    pub fn delete_bookmark(&mut self, group: &str, index: usize) -> Result<Bookmark, BoardError> {
        let group_name = group.to_string();
        let items = self.group_mut(group)?;
        if index >= items.len() {
            return Err(BoardError::IndexOutOfRange { group: group_name, index });
        }
        Ok(items.remove(index))
    }

    /// Splice semantics of the drag handler: remove from the source position,
    /// insert at the target position (clamped to the target group's length).
    pub fn move_bookmark(
        &mut self,
        from_group: &str,
        from_index: usize,
        to_group: &str,
        to_index: usize,
    ) -> Result<(), BoardError> {
        if !self.bookmarks.contains_key(to_group) {
            return Err(BoardError::GroupNotFound(to_group.to_string()));
        }
        let moved = self.delete_bookmark(from_group, from_index)?;
        let items = self.group_mut(to_group)?;
        let at = to_index.min(items.len());
        items.insert(at, moved);
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Board::default();
    }

    pub fn total_bookmarks(&self) -> usize {
        self.bookmarks.values().map(|items| items.len()).sum()
    }

    pub fn export(&self) -> ExportPayload {
        ExportPayload {
            version: EXPORT_VERSION,
            bookmarks: self.bookmarks.clone(),
            group_order: self.group_order.clone(),
            collapsed_groups: self.collapsed_groups.clone(),
        }
    }

    /// Suggested download filename, e.g. `bookmarks 2026-08-26 121314.json`.
    pub fn export_filename(now: chrono::DateTime<chrono::Local>) -> String {
        format!("bookmarks {}.json", now.format("%Y-%m-%d %H%M%S"))
    }

    /// Replaces the board from an imported JSON document. Accepts the
    /// versioned payload, a bare bookmark array (goes to the default group)
    /// and the legacy group-map object.
    pub fn import(&mut self, value: serde_json::Value) -> Result<(), BoardError> {
        let imported = Self::from_import(value)?;
        *self = imported;
        self.validate();
        Ok(())
    }

    fn from_import(value: serde_json::Value) -> Result<Board, BoardError> {
        if value.get("bookmarks").is_some() {
            let payload: ExportPayload = serde_json::from_value(value)
                .map_err(|err| BoardError::InvalidPayload(err.to_string()))?;
            let group_order = if payload.group_order.is_empty() {
                payload.bookmarks.keys().cloned().collect()
            } else {
                payload.group_order
            };
            return Ok(Board {
                bookmarks: payload.bookmarks,
                group_order,
                collapsed_groups: payload.collapsed_groups,
            });
        }

        if value.is_array() {
            // legacy: a flat list of bookmarks for the default group
            let items: Vec<Bookmark> = serde_json::from_value(value)
                .map_err(|err| BoardError::InvalidPayload(err.to_string()))?;
            return Ok(Board {
                bookmarks: HashMap::from([(DEFAULT_GROUP.to_string(), items)]),
                group_order: vec![DEFAULT_GROUP.to_string()],
                collapsed_groups: Vec::new(),
            });
        }

        if value.is_object() {
            // legacy: groups mapped straight to bookmark lists
            let bookmarks: HashMap<String, Vec<Bookmark>> = serde_json::from_value(value)
                .map_err(|err| BoardError::InvalidPayload(err.to_string()))?;
            let group_order = bookmarks.keys().cloned().collect();
            return Ok(Board {
                bookmarks,
                group_order,
                collapsed_groups: Vec::new(),
            });
        }

        Err(BoardError::InvalidPayload(
            "expected an object or an array of bookmarks".to_string(),
        ))
    }
}
