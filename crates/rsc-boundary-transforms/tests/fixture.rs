use std::{fs, path::PathBuf};

use rsc_boundary_transforms::transform;
use testing::{NormalizedOutput, fixture};

mod common;

use common::{PROJECT_ROOT, caller_for, print};

#[fixture("tests/fixture/**/input.js")]
fn boundary_fixture(input: PathBuf) {
    let dir = input.parent().unwrap();
    let output_path = dir.join("output.js");
    let source = fs::read_to_string(&input).unwrap();

    let output = transform(&source, format!("{PROJECT_ROOT}/input.js"), &caller_for(&input))
        .unwrap_or_else(|err| panic!("{err}"));

    let actual = print(&output.code);
    let expected = fs::read_to_string(&output_path)
        .map(|expected| print(&expected))
        .unwrap_or_default();
    if actual != expected {
        // Run with `UPDATE=1` to regenerate the expected output.
        NormalizedOutput::from(actual)
            .compare_to_file(&output_path)
            .unwrap();
    }

    let metadata = dir.join("metadata.json");
    if metadata.exists() {
        NormalizedOutput::compare_json_to_file(&output.metadata, &metadata);
    }
}
