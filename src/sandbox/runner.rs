//! Test-case runner over the sandbox executor.
//!
//! Runs learner code once per test case and compares trimmed stdout with the
//! expected output. Exercises come in two shapes: programs that read stdin
//! and print, and exercises asking for a single function. For the latter the
//! case input is a comma-separated argument list, so the runner generates a
//! harness that calls the function and prints its return value.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::sandbox::{ExecutionResult, ExecutionStatus, SandboxExecutor};

/// One test case: input (stdin or argument list) and expected stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Outcome of one test case.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseResult {
    pub test_number: usize,
    pub passed: bool,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub error: Option<String>,
}

/// Run `code` against an ordered list of test cases.
///
/// Retains the last execution's timing and error fields; the error is
/// cleared when every case passed. An empty case list degenerates to a
/// single run with no stdin.
pub async fn run_test_suite(
    executor: &SandboxExecutor,
    code: &str,
    test_cases: &[TestCase],
) -> ExecutionResult {
    if test_cases.is_empty() {
        return executor.execute(code, "").await;
    }

    let function_name = extract_function_name(code);

    let mut results = Vec::with_capacity(test_cases.len());
    let mut all_passed = true;
    let mut last_result = None;

    for (index, case) in test_cases.iter().enumerate() {
        let expected = case.expected_output.trim();

        let result = match &function_name {
            Some(name) => {
                let harness = generate_test_harness(code, name, &parse_test_input(&case.input));
                executor.execute(&harness, "").await
            }
            None => executor.execute(code, &case.input).await,
        };

        let actual = result.output.trim().to_string();
        let passed = actual == expected && result.status == ExecutionStatus::Success;

        results.push(TestCaseResult {
            test_number: index + 1,
            passed,
            input: case.input.clone(),
            expected_output: expected.to_string(),
            actual_output: actual,
            error: if result.error.is_empty() {
                None
            } else {
                Some(result.error.clone())
            },
        });

        if !passed {
            all_passed = false;
        }
        last_result = Some(result);
    }

    // Non-empty case list, so last_result is always set by the loop.
    let mut aggregate = match last_result {
        Some(result) => result,
        None => return executor.execute(code, "").await,
    };
    aggregate.test_results = results;
    aggregate.status = if all_passed {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::FailedTests
    };
    if all_passed {
        aggregate.error.clear();
    }
    aggregate
}

static FUNCTION_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"def\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").expect("valid function pattern")
});

/// Extract the first function name defined in learner code, if any.
pub fn extract_function_name(code: &str) -> Option<String> {
    FUNCTION_DEF
        .captures(code)
        .map(|caps| caps[1].to_string())
}

/// Split a case input like `"5, 3"` into argument strings.
pub fn parse_test_input(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input.split(',').map(|arg| arg.trim().to_string()).collect()
}

/// Generate a harness that calls `function_name` with the parsed arguments
/// and prints the result.
pub fn generate_test_harness(user_code: &str, function_name: &str, args: &[String]) -> String {
    let args_str = args.join(", ");
    format!(
        r#"{user_code}

if __name__ == '__main__':
    try:
        result = {function_name}({args_str})
        print(result)
    except Exception as e:
        print(f"Error: {{e}}", file=__import__('sys').stderr)
        raise
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_first_function_name() {
        let code = "def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b\n";
        assert_eq!(extract_function_name(code), Some("add".to_string()));
    }

    #[test]
    fn no_function_means_none() {
        assert_eq!(extract_function_name("print('hi')"), None);
        // `defined` must not match as a definition.
        assert_eq!(extract_function_name("defined = 1"), None);
    }

    #[test]
    fn parses_comma_separated_args() {
        assert_eq!(parse_test_input("5, 3"), vec!["5", "3"]);
        assert_eq!(parse_test_input("-5,3"), vec!["-5", "3"]);
        assert_eq!(parse_test_input("  "), Vec::<String>::new());
        assert_eq!(parse_test_input("'a', 'b'"), vec!["'a'", "'b'"]);
    }

    #[test]
    fn harness_calls_function_with_args() {
        let code = "def add(a, b):\n    return a + b";
        let harness =
            generate_test_harness(code, "add", &["1".to_string(), "2".to_string()]);
        assert!(harness.contains("result = add(1, 2)"));
        assert!(harness.contains("print(result)"));
        assert!(harness.starts_with(code));
    }

    #[test]
    fn harness_with_no_args() {
        let harness = generate_test_harness("def answer():\n    return 42", "answer", &[]);
        assert!(harness.contains("result = answer()"));
    }
}
