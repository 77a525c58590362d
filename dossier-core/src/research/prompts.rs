//! Prompt templates for every model-backed stage.

use crate::types::SubjectType;

pub const CLARIFY_SYSTEM: &str = "You decide whether a research request can be acted on as written. \
You never perform the research yourself.";

pub const BRIEF_SYSTEM: &str = "You turn short research requests into precise research briefs for a \
team of analysts. You write in markdown.";

pub const EVALUATOR_SYSTEM: &str = "You are a strict reviewer. You answer with a single JSON object \
and nothing else.";

pub const RESEARCHER_SYSTEM: &str = "You are a research analyst. You gather evidence with the tools \
available to you, cite every fact, and stop calling tools once the topic is covered.";

pub const SYNTHESIS_SYSTEM: &str = "You write long-form research profiles from the findings you are \
given. You never invent facts and you cite every claim with the numbers provided.";

pub fn clarify(query: &str) -> String {
    format!(
        "Research request:\n\"\"\"\n{query}\n\"\"\"\n\n\
         Decide whether the subject of this request is identifiable without further input. \
         Ambiguous names shared by several well-known entities, or requests with no identifiable \
         subject at all, need clarification.\n\n\
         If no clarification is needed, answer exactly:\nneed_clarification: false\n\n\
         Otherwise answer with one short, friendly question for the user that resolves the ambiguity."
    )
}

pub fn brief(
    query: &str,
    subject_type: SubjectType,
    current_date: &str,
    feedback: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Today's date is {current_date}.\n\n\
         Write a research brief for a profile of the following {subject_type}:\n\
         \"\"\"\n{query}\n\"\"\"\n\n\
         Structure the brief as markdown sections. Each `##` section is one independently \
         researchable topic (for example overview, leadership, products, financials, recent news, \
         relationships with us) followed by bullet points listing the concrete questions to answer. \
         Keep it specific to this {subject_type}; do not answer the questions."
    );
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "\n\nA reviewer rejected the previous brief. Address this feedback:\n{feedback}"
        ));
    }
    prompt
}

pub fn brief_evaluation(query: &str, subject_type: SubjectType, brief: &str) -> String {
    format!(
        "Request ({subject_type}): {query}\n\nResearch brief:\n\"\"\"\n{brief}\n\"\"\"\n\n\
         Does this brief cover the request with specific, researchable questions grouped into \
         sections? Respond with JSON: {{\"passes\": true|false, \"revision_prompt\": \"what to fix\"}}"
    )
}

pub fn report_evaluation(brief: &str, report: &str) -> String {
    format!(
        "Research brief:\n\"\"\"\n{brief}\n\"\"\"\n\nReport:\n\"\"\"\n{report}\n\"\"\"\n\n\
         Check that the report answers the brief, that claims carry [n] citations, and that it \
         contains no unsupported speculation. Respond with JSON: \
         {{\"passes\": true|false, \"revision_prompt\": \"specific instructions for the next draft\"}}"
    )
}

pub fn researcher(question_group: &str, subject_type: SubjectType, tools: &[String]) -> String {
    format!(
        "Research topic for a {subject_type} profile:\n{question_group}\n\n\
         Available tools: {}. Use them to collect evidence for every question in the topic. \
         Prefer internal_search for anything about our own relationship with the subject. \
         When you have enough, reply with a short summary instead of another tool call.",
        tools.join(", ")
    )
}

#[allow(clippy::too_many_arguments)]
pub fn synthesis(
    brief: &str,
    subject_type: SubjectType,
    focus_area: Option<&str>,
    context: &str,
    current_date: &str,
    relationship_directive: &str,
    revision: Option<(&str, &str)>,
) -> String {
    let mut prompt = format!(
        "Today's date is {current_date}.\n\n\
         Write a comprehensive {subject_type} profile answering this brief:\n\"\"\"\n{brief}\n\"\"\"\n\n"
    );
    if let Some(focus) = focus_area {
        prompt.push_str(&format!("Give particular depth to: {focus}\n\n"));
    }
    prompt.push_str(context);
    prompt.push_str(
        "\n\nRules:\n\
         - Use markdown with a `#` title and `##` sections, including a Relationships section.\n\
         - Cite every claim inline with the [n] numbers from the consolidated source list.\n\
         - Only use facts present in the findings above.\n\
         - End with a `## Sources` section.\n\n",
    );
    prompt.push_str(relationship_directive);
    if let Some((previous, feedback)) = revision {
        prompt.push_str(&format!(
            "\n\nYour previous draft was rejected.\nPrevious draft:\n\"\"\"\n{previous}\n\"\"\"\n\n\
             Revise it following these instructions:\n{feedback}"
        ));
    }
    prompt
}
