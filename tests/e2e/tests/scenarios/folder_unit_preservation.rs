//! Scenario: a folder treated as one atomic move unit lands both of its
//! files at the destination under a single shared reason tag, with one
//! movement-log entry per file.

use sortai_core::{execute_folder_unit, CollisionPolicy, OperationMode, OrganizePlan};
use sortai_e2e_tests::harness::TestWorkspace;
use sortai_e2e_tests::mocks::fixtures::FixtureFactory;

#[test]
fn folder_unit_moves_together_under_one_reason() {
    let mut workspace = TestWorkspace::new();
    workspace.seed_category(&["Personal", "Photos"], "beach sunset vacation photo");

    let (_source_folder, files) = FixtureFactory::write_folder_unit(&workspace);
    assert_eq!(files.len(), 2);

    let destination_dir = workspace.path().join("Personal/Photos");
    let reason = "folder-unit:trip-photos";

    let plans: Vec<OrganizePlan> = files
        .iter()
        .map(|file| OrganizePlan {
            file_id: uuid::Uuid::new_v4(),
            source: file.absolute_path.clone(),
            destination_dir: destination_dir.clone(),
            mode: OperationMode::Move,
            collision_policy: CollisionPolicy::ParenthesizedCounter,
            prefer_symlink: false,
        })
        .collect();

    let moved = execute_folder_unit(&plans, &mut workspace.movement, reason).expect("folder unit move should succeed");
    assert_eq!(moved.len(), 2);
    for path in &moved {
        assert!(path.exists());
        assert!(path.starts_with(&destination_dir));
    }
    for file in &files {
        assert!(!file.absolute_path.exists(), "source file should no longer exist after a move");
    }

    assert_eq!(workspace.movement.len(), 2);
    for entry in workspace.movement.entries() {
        assert_eq!(entry.reason, reason);
    }
}
