use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};

use minipy::evaluator::{BufferConductor, Evaluator};
use minipy::fixtures::{Case, CaseClass, load_cases, normalize_output};
use minipy::module::NullLoader;
use minipy::runtime::context::Options;

fn run_case(case: &Case) -> Result<Vec<String>> {
    let source = fs::read_to_string(&case.program_path)
        .with_context(|| format!("Reading {}", case.name))?;
    let options = Options {
        step_limit: case.spec.step_limit.unwrap_or(0),
        ..Options::default()
    };
    let mut evaluator = Evaluator::new(BufferConductor::default(), NullLoader, options);
    evaluator.evaluate_chunk(&source);
    Ok(evaluator.conductor().lines.clone())
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        if case.spec.bench.enabled {
            ensure!(
                !case.spec.bench.tags.is_empty(),
                "Case {} has bench enabled but no tags",
                case.name
            );
        }

        let lines = run_case(&case)?;
        let joined = lines.join("\n");

        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                let stdout_file = case
                    .spec
                    .expected
                    .stdout_file
                    .as_deref()
                    .with_context(|| format!("Missing stdout_file in {}", case.name))?;
                let expected = case.read_text(stdout_file)?;
                ensure!(
                    !joined.starts_with("Error:") && !joined.contains("\nError:"),
                    "Case {} failed unexpectedly: {joined}",
                    case.name
                );
                assert_eq!(
                    normalize_output(&joined),
                    normalize_output(&expected),
                    "Output mismatch for {}",
                    case.name
                );
            }
            CaseClass::FrontendError | CaseClass::RuntimeError => {
                let expected_file = case
                    .spec
                    .expected
                    .error_contains_file
                    .as_deref()
                    .with_context(|| format!("Missing error_contains_file in {}", case.name))?;
                let expected = case.read_text(expected_file)?;
                let expected = expected.trim();
                let error_line = lines
                    .iter()
                    .find(|line| line.starts_with("Error:"))
                    .with_context(|| {
                        format!("Expected an error line in {}, got {lines:?}", case.name)
                    })?;
                ensure!(
                    error_line.contains(expected),
                    "Expected error containing '{expected}' in {}, got '{error_line}'",
                    case.name
                );
            }
        }
    }

    Ok(())
}
