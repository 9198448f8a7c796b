//! Movement Log & Undo Stack (C7, spec §4.7)
//!
//! An append-only log of every filesystem mutation the organizer performs, paired
//! with bounded undo/redo stacks of invertible commands. The log entry for a
//! command is never removed by undo; undo only marks it `undone` with a timestamp
//! (spec §8 "movement log is never lossy").

use std::collections::VecDeque;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::FileId;

pub type MovementId = Uuid;

/// Default bound on the undo/redo stacks (spec §4.7).
pub const DEFAULT_STACK_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Move,
    Copy,
    Symlink,
    /// The inverse of `Copy`/`Symlink`: remove the file at `source`, gated on it
    /// still matching `destination` (content hash for a copy, link target for a
    /// symlink). Never produced by the organizer, only by [`Command::inverse`].
    Unlink,
}

/// A single filesystem action. Applying a `Move`/`Copy`/`Symlink` command performs
/// that action; its `inverse()` undoes it, but not by simply replaying the same
/// kind backwards (spec §4.7 "Invertible commands"):
/// - `Move` inverts to another `Move`, source and destination swapped.
/// - `Copy`/`Symlink` invert to `Unlink`: the destination they created is removed,
///   never re-created by copying/linking again, and only after verifying it still
///   matches the original (so a file the user has since edited is left alone).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub file_id: FileId,
    pub kind: MoveKind,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Command {
    pub fn inverse(&self) -> Command {
        let kind = match self.kind {
            MoveKind::Move => MoveKind::Move,
            MoveKind::Copy | MoveKind::Symlink => MoveKind::Unlink,
            MoveKind::Unlink => MoveKind::Unlink,
        };
        Command {
            file_id: self.file_id,
            kind,
            source: self.destination.clone(),
            destination: self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementLogEntry {
    pub id: MovementId,
    pub command: Command,
    pub performed_at: DateTime<Utc>,
    pub undone: bool,
    pub undone_at: Option<DateTime<Utc>>,
    /// Free-text reason recorded at apply time (e.g. "phase2 auto-apply",
    /// "user correction"), surfaced in `status`/`export`.
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("log entry not found: {0}")]
    EntryNotFound(MovementId),
}

pub type Result<T> = std::result::Result<T, MovementError>;

/// Append-only movement log with bounded undo/redo stacks. Pushing a new command
/// clears the redo stack (spec "redo cleared on new push").
pub struct MovementLog {
    entries: Vec<MovementLogEntry>,
    undo_stack: VecDeque<MovementId>,
    redo_stack: VecDeque<MovementId>,
    stack_depth: usize,
}

impl MovementLog {
    pub fn new(stack_depth: usize) -> Self {
        Self {
            entries: Vec::new(),
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            stack_depth,
        }
    }

    /// Record a command as already performed, returning its log entry id.
    pub fn record(&mut self, command: Command, reason: impl Into<String>, now: DateTime<Utc>) -> MovementId {
        let id = Uuid::new_v4();
        self.entries.push(MovementLogEntry {
            id,
            command,
            performed_at: now,
            undone: false,
            undone_at: None,
            reason: reason.into(),
        });
        self.push_undo(id);
        self.redo_stack.clear();
        id
    }

    fn push_undo(&mut self, id: MovementId) {
        self.undo_stack.push_back(id);
        while self.undo_stack.len() > self.stack_depth {
            self.undo_stack.pop_front();
        }
    }

    fn push_redo(&mut self, id: MovementId) {
        self.redo_stack.push_back(id);
        while self.redo_stack.len() > self.stack_depth {
            self.redo_stack.pop_front();
        }
    }

    fn entry_mut(&mut self, id: MovementId) -> Result<&mut MovementLogEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(MovementError::EntryNotFound(id))
    }

    /// Pop the most recent undoable command and return its inverse, for the caller
    /// to execute against the filesystem. Marks the log entry `undone`; the entry
    /// itself is never removed.
    pub fn undo(&mut self, now: DateTime<Utc>) -> Result<Command> {
        let id = self.undo_stack.pop_back().ok_or(MovementError::NothingToUndo)?;
        let entry = self.entry_mut(id)?;
        let inverse = entry.command.inverse();
        entry.undone = true;
        entry.undone_at = Some(now);
        self.push_redo(id);
        Ok(inverse)
    }

    /// Pop the most recently undone command and return its original (forward) form
    /// for the caller to re-execute.
    pub fn redo(&mut self, now: DateTime<Utc>) -> Result<Command> {
        let id = self.redo_stack.pop_back().ok_or(MovementError::NothingToRedo)?;
        let entry = self.entry_mut(id)?;
        entry.undone = false;
        entry.undone_at = None;
        let command = entry.command.clone();
        let _ = now;
        self.push_undo(id);
        Ok(command)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn entries(&self) -> &[MovementLogEntry] {
        &self.entries
    }

    pub fn entries_for_file(&self, file_id: FileId) -> Vec<&MovementLogEntry> {
        self.entries.iter().filter(|e| e.command.file_id == file_id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MovementLog {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_DEPTH)
    }
}
