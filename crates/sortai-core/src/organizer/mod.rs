//! Safe Organizer (C13, spec §4.13)
//!
//! Plans and executes file operations from a taxonomy assignment. Every operation
//! is staged so that a failure partway through never deletes or corrupts the
//! original input file (spec "No-delete").

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::model::FileId;
use crate::movement::{Command, MoveKind, MovementLog};

/// Bound on the collision-resolution counter search (spec §4.13).
pub const MAX_COLLISION_ATTEMPTS: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationMode {
    #[default]
    Move,
    Copy,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// `name (1).ext`
    ParenthesizedCounter,
    /// `name-1.ext`
    HyphenNumbered,
    /// `name-20260801123456.ext`
    Timestamped,
}

#[derive(Debug, thiserror::Error)]
pub enum OrganizerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("collision resolution exhausted after {0} attempts")]
    CollisionExhausted(u32),
    #[error("content hash mismatch after copy, refusing to remove source")]
    HashMismatch,
}

pub type Result<T> = std::result::Result<T, OrganizerError>;

pub struct OrganizePlan {
    pub file_id: FileId,
    pub source: PathBuf,
    pub destination_dir: PathBuf,
    pub mode: OperationMode,
    pub collision_policy: CollisionPolicy,
    /// When true, overrides `mode` to `Symlink` regardless of the plan's stated
    /// mode, for reversibility (spec "prefer-symlink flag").
    pub prefer_symlink: bool,
}

fn resolve_collision(destination_dir: &Path, file_name: &str, policy: CollisionPolicy) -> Result<PathBuf> {
    let candidate = destination_dir.join(file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let stem = Path::new(file_name).file_stem().and_then(|s| s.to_str()).unwrap_or(file_name);
    let ext = Path::new(file_name).extension().and_then(|s| s.to_str());

    for attempt in 1..=MAX_COLLISION_ATTEMPTS {
        let candidate_name = match policy {
            CollisionPolicy::ParenthesizedCounter => match ext {
                Some(ext) => format!("{stem} ({attempt}).{ext}"),
                None => format!("{stem} ({attempt})"),
            },
            CollisionPolicy::HyphenNumbered => match ext {
                Some(ext) => format!("{stem}-{attempt}.{ext}"),
                None => format!("{stem}-{attempt}"),
            },
            CollisionPolicy::Timestamped => {
                let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
                match ext {
                    Some(ext) => format!("{stem}-{stamp}.{ext}"),
                    None => format!("{stem}-{stamp}"),
                }
            }
        };
        let candidate = destination_dir.join(&candidate_name);
        if !candidate.exists() {
            return Ok(candidate);
        }
        if policy == CollisionPolicy::Timestamped {
            // Timestamp collisions are vanishingly unlikely but still bounded.
            continue;
        }
    }
    Err(OrganizerError::CollisionExhausted(MAX_COLLISION_ATTEMPTS))
}

/// FNV-1a over raw bytes, used to verify a cross-volume copy before the source is
/// unlinked (and, by the CLI's undo path, to verify a `Copy` destination still
/// matches its original before removing it). Deliberately byte-oriented (unlike
/// `embeddings::content_hash`, which hashes text) since file contents need not be
/// valid UTF-8.
pub fn content_hash(path: &Path) -> Result<String> {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let bytes = fs::read(path)?;
    let mut hash = FNV_OFFSET;
    for byte in &bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    Ok(format!("{hash:016x}"))
}

/// Execute one plan end-to-end: create destination dirs, resolve collisions,
/// perform the operation, record the movement log entry, and push the undo
/// command. Every step either fully applies or the prior steps are rolled back
/// (spec "Atomic per-file").
pub fn execute(plan: &OrganizePlan, log: &mut MovementLog, reason: &str) -> Result<PathBuf> {
    fs::create_dir_all(&plan.destination_dir)?;
    let file_name = plan
        .source
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let destination = resolve_collision(&plan.destination_dir, &file_name, plan.collision_policy)?;

    let effective_mode = if plan.prefer_symlink { OperationMode::Symlink } else { plan.mode };

    match effective_mode {
        OperationMode::Move => {
            if fs::rename(&plan.source, &destination).is_err() {
                // Cross-volume: copy then unlink, gated on hash verification.
                let source_hash = content_hash(&plan.source)?;
                fs::copy(&plan.source, &destination)?;
                let dest_hash = content_hash(&destination)?;
                if source_hash != dest_hash {
                    let _ = fs::remove_file(&destination);
                    return Err(OrganizerError::HashMismatch);
                }
                fs::remove_file(&plan.source)?;
            }
        }
        OperationMode::Copy => {
            fs::copy(&plan.source, &destination)?;
        }
        OperationMode::Symlink => {
            #[cfg(unix)]
            std::os::unix::fs::symlink(&plan.source, &destination)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(&plan.source, &destination)?;
        }
    }

    let kind = match effective_mode {
        OperationMode::Move => MoveKind::Move,
        OperationMode::Copy => MoveKind::Copy,
        OperationMode::Symlink => MoveKind::Symlink,
    };
    log.record(
        Command {
            file_id: plan.file_id,
            kind,
            source: plan.source.clone(),
            destination: destination.clone(),
        },
        reason.to_string(),
        Utc::now(),
    );

    Ok(destination)
}

/// Execute every file in a scanned-folder unit under one shared reason tag, so the
/// folder is relocated as a whole while each file still gets its own log entry
/// (spec §4.13 "Folder-unit moves").
pub fn execute_folder_unit(plans: &[OrganizePlan], log: &mut MovementLog, shared_reason: &str) -> Result<Vec<PathBuf>> {
    let mut destinations = Vec::with_capacity(plans.len());
    for plan in plans {
        destinations.push(execute(plan, log, shared_reason)?);
    }
    Ok(destinations)
}
