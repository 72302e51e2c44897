//! Human-readable evaluation reports for reflector prompts and logs.

use reflace_core::environment::EvaluationResult;

/// Render an evaluation as a sectioned report.
///
/// ```text
/// Task Status : Failed
/// ---
///
/// Task Requirement Count:
/// - total requirements : 3
/// ...
/// ```
pub fn render_report(eval: &EvaluationResult) -> String {
    let mut out = String::new();

    let status = if eval.success() { "Succeed" } else { "Failed" };
    out.push_str(&format!("Task Status : {status}\n---\n\n"));

    out.push_str(&format!(
        "Task Requirement Count:\n- total requirements : {}\n- passed requirements : {}\n- failed requirements : {}\n---\n\n",
        eval.total_count, eval.passed_count, eval.failed_count
    ));

    if !eval.pass_details.is_empty() {
        out.push_str("Detail of passed requirements:\n");
        for check in &eval.pass_details {
            out.push_str(&format!(
                "{{'requirement': {:?}, 'label': {:?}}}\n",
                check.requirement, check.detail
            ));
        }
        out.push_str("---\n\n");
    }

    if !eval.fail_details.is_empty() {
        out.push_str("Detail of failed requirements:\n");
        for check in &eval.fail_details {
            out.push_str(&format!(
                "{{'requirement': {:?}, 'failed_reason': {:?}}}\n",
                check.requirement, check.detail
            ));
        }
        out.push_str("---\n\n");
    }

    out
}
