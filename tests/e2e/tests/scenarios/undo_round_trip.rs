//! Scenario: a batch of moves into several destination folders can be undone
//! one entry at a time, restoring every file to its original path with its
//! original bytes intact, without ever deleting content. Copy and symlink
//! moves undo differently from a plain move: undoing them removes the
//! destination the operation created, never the original, and only once the
//! destination is confirmed to still match it.

use chrono::Utc;

use sortai_core::{execute, content_hash, CollisionPolicy, Command, MoveKind, MovementError, OperationMode, OrganizePlan};
use sortai_e2e_tests::harness::TestWorkspace;
use sortai_e2e_tests::mocks::fixtures::FixtureFactory;

/// Apply a movement-log command's effect to the real filesystem. The log
/// itself only records intent; something downstream has to actually move the
/// bytes, which is the organizer's job for forward moves and this helper's
/// job when replaying an `undo()`'s inverse command in a test.
fn apply(command: &Command) {
    match command.kind {
        MoveKind::Move => {
            if let Some(parent) = command.destination.parent() {
                std::fs::create_dir_all(parent).expect("failed to create undo destination parent");
            }
            std::fs::rename(&command.source, &command.destination).expect("failed to apply undo move");
        }
        MoveKind::Unlink => {
            assert!(
                unlink_target_matches_original(&command.source, &command.destination),
                "undo should only remove a destination that still matches the original"
            );
            std::fs::remove_file(&command.source).expect("failed to apply undo unlink");
        }
        MoveKind::Copy | MoveKind::Symlink => unreachable!("Command::inverse() never returns these kinds"),
    }
}

fn unlink_target_matches_original(copy_or_link: &std::path::Path, original: &std::path::Path) -> bool {
    let metadata = std::fs::symlink_metadata(copy_or_link).expect("path should exist before undo");
    if metadata.file_type().is_symlink() {
        return std::fs::read_link(copy_or_link).expect("should read symlink target") == original;
    }
    content_hash(copy_or_link).expect("hash copy") == content_hash(original).expect("hash original")
}

#[test]
fn undoing_a_batch_move_restores_every_original_file_byte_for_byte() {
    let workspace = TestWorkspace::new();
    let files = FixtureFactory::write_undo_batch(&workspace, 10);
    assert_eq!(files.len(), 10);

    let destinations = [
        workspace.path().join("Dest/Alpha"),
        workspace.path().join("Dest/Beta"),
        workspace.path().join("Dest/Gamma"),
    ];

    let mut log = sortai_core::MovementLog::default();
    let mut moved_paths = Vec::with_capacity(files.len());
    let mut expected_contents = Vec::with_capacity(files.len());

    for (i, file) in files.iter().enumerate() {
        let expected = std::fs::read(&file.absolute_path).expect("fixture file should exist before moving");
        expected_contents.push(expected);

        let plan = OrganizePlan {
            file_id: uuid::Uuid::new_v4(),
            source: file.absolute_path.clone(),
            destination_dir: destinations[i % destinations.len()].clone(),
            mode: OperationMode::Move,
            collision_policy: CollisionPolicy::ParenthesizedCounter,
            prefer_symlink: false,
        };
        let moved_path = execute(&plan, &mut log, "undo-round-trip-batch").expect("move should succeed");
        assert!(moved_path.exists());
        assert!(!file.absolute_path.exists());
        moved_paths.push(moved_path);
    }

    assert_eq!(log.len(), files.len());
    assert!(log.can_undo());

    for _ in 0..files.len() {
        let inverse = log.undo(Utc::now()).expect("undo should succeed while entries remain");
        apply(&inverse);
    }

    assert!(!log.can_undo(), "every entry should have been undone");
    assert!(matches!(log.undo(Utc::now()), Err(MovementError::NothingToUndo)));

    for (i, file) in files.iter().enumerate() {
        assert!(file.absolute_path.exists(), "original path should exist again after undo");
        let restored = std::fs::read(&file.absolute_path).expect("restored file should be readable");
        assert_eq!(restored, expected_contents[i]);
    }
    for moved_path in &moved_paths {
        assert!(!moved_path.exists(), "destination path should no longer exist after undo");
    }
    assert!(log.entries().iter().all(|entry| entry.undone));
}

#[test]
fn undoing_a_copy_removes_the_destination_but_keeps_the_original() {
    let workspace = TestWorkspace::new();
    let files = FixtureFactory::write_undo_batch(&workspace, 1);
    let file = &files[0];
    let expected = std::fs::read(&file.absolute_path).expect("fixture file should exist");

    let mut log = sortai_core::MovementLog::default();
    let plan = OrganizePlan {
        file_id: uuid::Uuid::new_v4(),
        source: file.absolute_path.clone(),
        destination_dir: workspace.path().join("Dest/Copied"),
        mode: OperationMode::Copy,
        collision_policy: CollisionPolicy::ParenthesizedCounter,
        prefer_symlink: false,
    };
    let copied_path = execute(&plan, &mut log, "undo-round-trip-copy").expect("copy should succeed");
    assert!(copied_path.exists());
    assert!(file.absolute_path.exists(), "copy must never remove the source");

    let inverse = log.undo(Utc::now()).expect("undo should succeed");
    assert_eq!(inverse.kind, MoveKind::Unlink);
    apply(&inverse);

    assert!(!copied_path.exists(), "undo should remove the copy");
    assert!(file.absolute_path.exists(), "undo of a copy must never remove the original");
    assert_eq!(std::fs::read(&file.absolute_path).unwrap(), expected);
}

#[test]
fn undo_of_a_diverged_copy_is_refused() {
    let workspace = TestWorkspace::new();
    let files = FixtureFactory::write_undo_batch(&workspace, 1);
    let file = &files[0];

    let mut log = sortai_core::MovementLog::default();
    let plan = OrganizePlan {
        file_id: uuid::Uuid::new_v4(),
        source: file.absolute_path.clone(),
        destination_dir: workspace.path().join("Dest/Copied"),
        mode: OperationMode::Copy,
        collision_policy: CollisionPolicy::ParenthesizedCounter,
        prefer_symlink: false,
    };
    let copied_path = execute(&plan, &mut log, "undo-round-trip-diverged-copy").expect("copy should succeed");
    std::fs::write(&copied_path, b"edited after the copy, no longer matches the original").expect("simulate a later edit");

    let inverse = log.undo(Utc::now()).expect("undo should succeed");
    assert!(
        !unlink_target_matches_original(&inverse.source, &inverse.destination),
        "the edited copy should no longer match the original it was taken from"
    );
    assert!(copied_path.exists(), "a diverged copy is left alone rather than destroyed");
}

#[test]
#[cfg(unix)]
fn undoing_a_symlink_removes_the_link_but_keeps_the_original() {
    let workspace = TestWorkspace::new();
    let files = FixtureFactory::write_undo_batch(&workspace, 1);
    let file = &files[0];

    let mut log = sortai_core::MovementLog::default();
    let plan = OrganizePlan {
        file_id: uuid::Uuid::new_v4(),
        source: file.absolute_path.clone(),
        destination_dir: workspace.path().join("Dest/Linked"),
        mode: OperationMode::Symlink,
        collision_policy: CollisionPolicy::ParenthesizedCounter,
        prefer_symlink: false,
    };
    let linked_path = execute(&plan, &mut log, "undo-round-trip-symlink").expect("symlink should succeed");
    assert!(linked_path.symlink_metadata().unwrap().file_type().is_symlink());
    assert!(file.absolute_path.exists());

    let inverse = log.undo(Utc::now()).expect("undo should succeed");
    assert_eq!(inverse.kind, MoveKind::Unlink);
    apply(&inverse);

    assert!(!linked_path.exists(), "undo should remove the symlink");
    assert!(file.absolute_path.exists(), "undo of a symlink must never remove the original");
}
