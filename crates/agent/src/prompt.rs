//! Prompt templates for the actor, the reflectors and the insight generator.
//!
//! Every seed prompt is parameterized by the supervisor's identity and the
//! task instruction. A trial's seed carries at most one augmentation:
//! prior reflections or the rendered insight store, never both.

use reflace_core::environment::{GroundTruth, Supervisor};

/// System prompt for the acting model.
pub const ACTOR_SYSTEM_PROMPT: &str = "\
You are an autonomous agent that solves tasks by writing code and executing it \
in an interactive environment through the provided tool.

- Work step by step: inspect available APIs and data before acting on them.
- Each tool call runs one code block; its printed output is returned to you.
- Read every observation carefully and fix errors before moving on.
- Act on behalf of the supervisor described in the task; use their credentials.
- When the task is fully done, call the completion function in your code \
(for example `apis.supervisor.complete_task()`), passing the answer if one is asked for.";

/// System prompt for the reflexion critic.
pub const REFLECTOR_SYSTEM_PROMPT: &str = "\
You are the Reflector. Critique the Actor's trajectory (its code and the resulting \
observations) for a task it did not complete correctly.

- Execution success (no errors) does not mean task success; check that every part \
of the request was covered.
- Find the root cause of the failure, not just the symptom, and name the missed requirement.
- Propose a concrete correction the Actor can apply on its next attempt.
- Do not recommend APIs or fields the observations show do not exist.
- Keep the reflection concise: one or two sentences.";

/// System prompt for the insight reflector; its answer is parsed as JSON.
pub const INSIGHT_REFLECTOR_SYSTEM_PROMPT: &str = "\
You are the Reflector of a playbook-learning agent. Analyze the generator's trajectory \
and the evaluation report, judge which playbook entries helped or hurt, and distill \
reusable lessons. Answer with a single JSON object and nothing else.";

/// Critique used when the reflector returns nothing usable.
pub const EMPTY_REFLECTION_PLACEHOLDER: &str = "Reflection failed to generate.";

/// Extra context injected into a trial's seed prompt.
///
/// Combining reflections with insights has no defined template and is
/// therefore unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PromptAugmentation {
    #[default]
    None,
    /// Rendered reflection history
    Reflections(String),
    /// Rendered insight store
    Insights(String),
}

/// Build the seed user turn for a trial.
pub fn seed_prompt(
    supervisor: &Supervisor,
    instruction: &str,
    augmentation: &PromptAugmentation,
) -> String {
    let mut out = String::new();
    match augmentation {
        PromptAugmentation::None => {
            out.push_str("Using these APIs, now generate code to solve the actual task:\n\n");
        }
        PromptAugmentation::Reflections(_) => out.push_str(
            "Using these APIs and the reflection history of your previous attempts, \
now generate code to solve the actual task:\n\n",
        ),
        PromptAugmentation::Insights(_) => out.push_str(
            "Using these APIs and the playbook of strategies learned from earlier tasks, \
now generate code to solve the actual task:\n\n",
        ),
    }

    out.push_str(&identity_lines(supervisor));
    out.push_str("\n**Task**:\n");
    out.push_str(instruction.trim());
    out.push('\n');

    match augmentation {
        PromptAugmentation::None => {}
        PromptAugmentation::Reflections(text) => {
            out.push_str("\n**Reflection History**:\n");
            out.push_str(text.trim_end());
            out.push('\n');
        }
        PromptAugmentation::Insights(text) => {
            out.push_str("\n**Playbook**:\n");
            out.push_str(text.trim_end());
            out.push('\n');
        }
    }
    out
}

/// Inputs to a reflexion critique prompt.
pub struct CritiqueInput<'a> {
    pub supervisor: &'a Supervisor,
    pub instruction: &'a str,
    pub evaluation_report: &'a str,
    pub reflection_history: &'a str,
    pub trajectory: &'a str,
    pub ground_truth: Option<&'a GroundTruth>,
}

/// Build the reflexion critic's user prompt.
pub fn critique_prompt(input: &CritiqueInput<'_>) -> String {
    let mut out = String::from(
        "Please generate a reflection on the Actor's trajectory and your reflection history \
by analyzing the code, the execution logs and the earlier reflections.\n\n",
    );
    out.push_str("**Supervisor Information**:\n");
    out.push_str(&format!(
        "first name : {}\nlast name : {}\nemail : {}\nphone number : {}\n\n",
        input.supervisor.first_name,
        input.supervisor.last_name,
        input.supervisor.email,
        input.supervisor.phone_number
    ));
    out.push_str(&format!("**Task**:\n{}\n\n", input.instruction.trim()));
    out.push_str(&format!(
        "**Evaluation Report**:\n{}\n",
        input.evaluation_report.trim_end()
    ));
    out.push_str(&format!(
        "\n**Reflection History**:\n{}\n",
        input.reflection_history.trim_end()
    ));
    if let Some(truth) = input.ground_truth {
        out.push_str("\n**Reference Solution**:\n");
        if !truth.actions.is_empty() {
            out.push_str("Actions:\n");
            for (i, action) in truth.actions.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, action));
            }
        }
        if !truth.code.trim().is_empty() {
            out.push_str(&format!("Code:\n```\n{}\n```\n", truth.code.trim_end()));
        }
    }
    out.push_str(&format!(
        "\n**Trajectory (Code & Execution logs)**:\n{}\n",
        input.trajectory.trim_end()
    ));
    out
}

/// Build the insight reflector's user prompt.
pub fn insight_reflection_prompt(
    instruction: &str,
    evaluation_report: &str,
    trajectory: &str,
    playbook: &str,
) -> String {
    format!(
        "**Task:**\n{instruction}\n\n\
**Evaluation Report:**\n{report}\n\n\
**Model Action Trajectory:**\n{trajectory}\n\n\
**Playbook used by the generator:**\n{playbook}\n\n\
**Answer in this exact JSON format:**\n\
{{\n\
  \"reasoning\": \"[Your detailed analysis]\",\n\
  \"error_identification\": \"[What specifically went wrong?]\",\n\
  \"root_cause_analysis\": \"[Why did it go wrong? What was misunderstood?]\",\n\
  \"correct_approach\": \"[What should the generator have done instead?]\",\n\
  \"key_insight\": \"[The principle to remember next time]\",\n\
  \"bullet_tags\": [{{\"id\": \"shr-00001\", \"tag\": \"helpful\"}}],\n\
  \"new_insights\": [{{\"section\": \"strategies | code_snippets | troubleshooting\", \"content\": \"...\", \"replaces\": null}}]\n\
}}\n",
        instruction = instruction.trim(),
        report = evaluation_report.trim_end(),
        trajectory = trajectory.trim_end(),
        playbook = playbook.trim_end(),
    )
}

fn identity_lines(supervisor: &Supervisor) -> String {
    format!(
        "My name is {} {}.\nMy personal email is {} and phone number is {}.\n",
        supervisor.first_name, supervisor.last_name, supervisor.email, supervisor.phone_number
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> Supervisor {
        Supervisor {
            first_name: "Joyce".into(),
            last_name: "Weaver".into(),
            email: "joyce@example.com".into(),
            phone_number: "5550100".into(),
        }
    }

    #[test]
    fn plain_seed_has_identity_and_task_only() {
        let text = seed_prompt(&supervisor(), "eat the apple", &PromptAugmentation::None);
        assert!(text.contains("My name is Joyce Weaver."));
        assert!(text.contains("joyce@example.com and phone number is 5550100"));
        assert!(text.contains("**Task**:\neat the apple"));
        assert!(!text.contains("Reflection History"));
        assert!(!text.contains("Playbook"));
    }

    #[test]
    fn reflection_seed_includes_history() {
        let aug = PromptAugmentation::Reflections("1. Log in first.\n\n".into());
        let text = seed_prompt(&supervisor(), "task", &aug);
        assert!(text.contains("**Reflection History**:\n1. Log in first."));
        assert!(!text.contains("**Playbook**"));
    }

    #[test]
    fn insight_seed_includes_playbook() {
        let aug = PromptAugmentation::Insights("STRATEGIES AND HARD RULES:\n".into());
        let text = seed_prompt(&supervisor(), "task", &aug);
        assert!(text.contains("**Playbook**:\nSTRATEGIES AND HARD RULES:"));
        assert!(!text.contains("Reflection History"));
    }

    #[test]
    fn critique_prompt_includes_ground_truth_only_when_given() {
        let truth = GroundTruth {
            actions: vec!["spotify.login".into(), "spotify.show_song_library".into()],
            code: "print(1)".into(),
        };
        let sup = supervisor();
        let mut input = CritiqueInput {
            supervisor: &sup,
            instruction: "list songs",
            evaluation_report: "Task Status : Failed",
            reflection_history: "None",
            trajectory: "<User>\nlist songs\n</User>",
            ground_truth: None,
        };
        let without = critique_prompt(&input);
        assert!(!without.contains("Reference Solution"));
        assert!(without.contains("first name : Joyce"));
        assert!(without.contains("**Reflection History**:\nNone"));

        input.ground_truth = Some(&truth);
        let with = critique_prompt(&input);
        assert!(with.contains("1. spotify.login\n2. spotify.show_song_library"));
        assert!(with.contains("```\nprint(1)\n```"));
    }

    #[test]
    fn insight_prompt_asks_for_json() {
        let text = insight_reflection_prompt("t", "r", "traj", "(none)");
        assert!(text.contains("\"bullet_tags\""));
        assert!(text.contains("\"new_insights\""));
        assert!(text.contains("**Playbook used by the generator:**\n(none)"));
    }
}
