//! Textual diagnostic dump helpers, generalized from the original's
//! `rtune_var_print_list_range` and `rtune_func_print_doubleFunc_shortVar`.
//!
//! These are plain formatting helpers, not wired to any logger — a host
//! that wants to print engine state outside of the `log` facade (e.g.
//! into a test harness's stdout) can call them directly. The scheduler
//! and evaluator use `log::trace!`/`log::debug!`/`log::info!`/
//! `log::warn!` for their own per-call diagnostics; this module is for
//! dumping a whole trace at once.

use crate::function::Function;
use crate::tunable::Tunable;
use std::fmt::Write as _;

/// Formats a Tunable's entire state trace as a single comma-separated
/// line, the direct descendant of `rtune_var_print_list_range`:
/// `"<count>: var <name>[<n>]: v0, v1, ..."`.
pub fn dump_tunable(tunable: &Tunable, count: i64) -> String {
    let mut out = String::new();
    let _ = write!(out, "{count}: var {}[{}]: ", tunable.state.name, tunable.state.count());
    let rendered: Vec<String> = tunable.state.states().iter().map(|v| v.to_string()).collect();
    out.push_str(&rendered.join(", "));
    out
}

/// Formats a Function's state trace alongside each input Tunable's
/// trace, the direct descendant of `rtune_func_print_doubleFunc_shortVar`:
/// a header line naming the function and iteration, a tab-separated row
/// of sample indices, a row of the function's own values, then one row
/// per input Tunable's paired state (resolved through `input_trace`).
pub fn dump_function(function: &Function, inputs: &[&Tunable], count: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "=============== values for func {} at iteration: {count} ====================",
        function.state.name
    );
    let n = function.state.count();
    let indices: Vec<String> = (0..n).map(|i| i.to_string()).collect();
    let _ = writeln!(out, "\t\t\t\t{}", indices.join("\t\t"));

    let values: Vec<String> = function.state.states().iter().map(|v| format!("{v:.2}")).collect();
    let _ = writeln!(out, "func {}: \t{}", function.state.name, values.join("\t"));

    for (pos, input) in inputs.iter().enumerate() {
        let paired: Vec<String> = (0..n)
            .map(|i| {
                function
                    .input_trace
                    .get(i)
                    .and_then(|snapshot| snapshot.get(pos))
                    .and_then(|&idx| input.state.get(idx))
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "?".to_string())
            })
            .collect();
        let _ = writeln!(out, "var {}: {}", input.state.name, paired.join("\t\t"));
    }
    out.push_str("================================================================================");
    out
}
