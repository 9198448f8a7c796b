//! Fixture Factory
//!
//! Deterministic generators for realistic messy filenames and the small file
//! sets each scenario is driven against. Keeping this out of the scenario
//! tests themselves means the same fixture can be reused by more than one
//! scenario without copy-pasting path literals.

use std::path::PathBuf;

use crate::harness::TestWorkspace;

const WORD_BANK: &[&str] = &[
    "invoice", "receipt", "handbook", "policy", "budget", "sunset", "beach", "vacation", "tutorial", "notes",
    "resume", "contract", "screenshot", "diagram", "presentation", "report", "statement", "itinerary", "recipe",
    "playlist",
];

fn pick(seed: u64) -> &'static str {
    WORD_BANK[(seed as usize) % WORD_BANK.len()]
}

/// Deterministic, filename-safe stem built from two word-bank entries and a
/// numeric suffix derived from `seed`. Referentially transparent, same as the
/// keyword extractor it feeds.
pub fn lorem_filename(seed: u64) -> String {
    let a = pick(seed);
    let b = pick(seed.wrapping_mul(31).wrapping_add(7));
    format!("{a}_{b}_{:04}", seed % 10_000)
}

#[derive(Debug, Clone)]
pub struct ScenarioFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Builds the small, named file sets each end-to-end scenario is driven
/// against.
pub struct FixtureFactory;

impl FixtureFactory {
    /// Five files that should be confidently assignable on the very first
    /// pass, assuming their target categories already have seeded
    /// prototypes: two invoices, two HR documents, one vacation photo.
    pub fn write_instant_pass_set(workspace: &TestWorkspace) -> Vec<ScenarioFile> {
        let specs: &[(&str, &[u8])] = &[
            ("Q1_invoice_acme.pdf", b"invoice body one"),
            ("Q2_invoice_acme.pdf", b"invoice body two"),
            ("employee_handbook_2024.pdf", b"handbook body"),
            ("hr_policy_update.pdf", b"policy body"),
            ("beach_sunset_hawaii.jpg", b"jpeg bytes"),
        ];
        specs
            .iter()
            .map(|(name, contents)| ScenarioFile {
                relative_path: name.to_string(),
                absolute_path: workspace.write_file(name, contents),
            })
            .collect()
    }

    /// A folder-unit: two files sharing a parent directory, which must move
    /// together under one shared reason tag.
    pub fn write_folder_unit(workspace: &TestWorkspace) -> (PathBuf, Vec<ScenarioFile>) {
        let folder = "Trip Photos";
        let names: &[(&str, &[u8])] = &[("sunset.jpg", b"jpeg-a"), ("beach.jpg", b"jpeg-b")];
        let files = names
            .iter()
            .map(|(name, contents)| {
                let relative = format!("{folder}/{name}");
                ScenarioFile {
                    relative_path: relative.clone(),
                    absolute_path: workspace.write_file(&relative, contents),
                }
            })
            .collect();
        (workspace.path().join(folder), files)
    }

    /// Two files sharing a keyword ("budget") but no taxonomic history yet;
    /// used to show that correcting the first teaches the graph something
    /// the second benefits from.
    pub fn write_correction_pair(workspace: &TestWorkspace) -> (ScenarioFile, ScenarioFile) {
        let first_relative = "quarterly_budget_draft.xlsx";
        let second_relative = "annual_budget_summary.xlsx";
        (
            ScenarioFile {
                relative_path: first_relative.to_string(),
                absolute_path: workspace.write_file(first_relative, b"budget-a"),
            },
            ScenarioFile {
                relative_path: second_relative.to_string(),
                absolute_path: workspace.write_file(second_relative, b"budget-b"),
            },
        )
    }

    /// A batch with no taxonomic history at all: three invoices, three
    /// recipes, and one outlier of a different coarse type with nothing in
    /// common with either group. Used to exercise the clusterer rather than
    /// prototype matching — every file here must fall through Phase 1 into
    /// `NeedsClustering`.
    pub fn write_unclustered_batch(workspace: &TestWorkspace) -> Vec<ScenarioFile> {
        let specs: &[(&str, &[u8])] = &[
            ("invoice_acme_q1.pdf", b"invoice body acme"),
            ("invoice_globex_q2.pdf", b"invoice body globex"),
            ("invoice_initech_q3.pdf", b"invoice body initech"),
            ("recipe_pasta_night.txt", b"recipe body pasta"),
            ("recipe_soup_winter.txt", b"recipe body soup"),
            ("recipe_cake_birthday.txt", b"recipe body cake"),
            ("zzqqxx_outlier_888.bin", b"outlier body"),
        ];
        specs
            .iter()
            .map(|(name, contents)| ScenarioFile {
                relative_path: name.to_string(),
                absolute_path: workspace.write_file(name, contents),
            })
            .collect()
    }

    /// `count` files, used to exercise a batch of moves followed by a batch
    /// undo.
    pub fn write_undo_batch(workspace: &TestWorkspace, count: usize) -> Vec<ScenarioFile> {
        (0..count)
            .map(|i| {
                let name = format!("{}.dat", lorem_filename(i as u64));
                ScenarioFile {
                    relative_path: name.clone(),
                    absolute_path: workspace.write_file(&name, format!("payload-{i}").as_bytes()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lorem_filename_is_deterministic() {
        assert_eq!(lorem_filename(42), lorem_filename(42));
    }

    #[test]
    fn instant_pass_set_writes_five_distinct_files() {
        let workspace = TestWorkspace::new();
        let files = FixtureFactory::write_instant_pass_set(&workspace);
        assert_eq!(files.len(), 5);
        for file in &files {
            assert!(file.absolute_path.exists());
        }
    }

    #[test]
    fn undo_batch_writes_the_requested_count() {
        let workspace = TestWorkspace::new();
        let files = FixtureFactory::write_undo_batch(&workspace, 10);
        assert_eq!(files.len(), 10);
    }
}
