//! Source-rewriting wrapper for sandboxed Python execution.
//!
//! Stdin is delivered in-band: the wrapper replaces `sys.stdin` with an
//! in-memory buffer seeded by the caller, so container stdin plumbing is
//! never relied on. Uncaught exceptions from learner code become a
//! `Runtime Error: <kind>: <msg>` line on stderr and a nonzero exit.

/// Build the wrapped Python source for one execution.
pub fn wrap_user_code(user_code: &str, stdin_data: &str) -> String {
    let indented_code = indent(user_code, 8);
    let stdin_escaped = escape_py_literal(stdin_data);

    format!(
        r#"import sys
import io
from contextlib import redirect_stdout, redirect_stderr

# Replace stdin with provided input
sys.stdin = io.StringIO('{stdin_escaped}')

# Capture output
stdout_capture = io.StringIO()
stderr_capture = io.StringIO()

try:
    with redirect_stdout(stdout_capture), redirect_stderr(stderr_capture):
{indented_code}

    output = stdout_capture.getvalue()
    if output:
        print(output, end='')

    error = stderr_capture.getvalue()
    if error:
        print(error, file=sys.stderr, end='')

except Exception as e:
    print(f"Runtime Error: {{type(e).__name__}}: {{e}}", file=sys.stderr)
    sys.exit(1)
"#
    )
}

/// Escape a string for embedding in a single-quoted Python literal.
///
/// Backslash must come first so it does not re-escape the others.
fn escape_py_literal(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
}

/// Indent every line of `code` by `spaces` spaces.
fn indent(code: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    code.lines()
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
