//! Prompt templates and output schemas
//!
//! Every component builds its [`GenerationRequest`] here so wording and
//! schema keys stay in one place.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::llm::GenerationRequest;
use crate::search::SearchResult;

use super::state::{Learning, SubQuery};

/// Researcher preamble set on the generation agent; `{today}` is replaced
pub const RESEARCHER_SYSTEM_PROMPT: &str = r#"<role>Expert Researcher</role>

<context>
Today is {today}. Follow these instructions when responding:
</context>

<instructions>
- You may be asked to research subjects that are after your knowledge cutoff. Assume the user is right when presented with news.
- The user is a highly experienced analyst. No need to simplify it, be as detailed as possible and make sure your response is correct.
- Be highly organized.
- Suggest solutions that the user did not think about.
- Be proactive and anticipate the user's needs.
- Treat the user as an expert in all subject matter.
- Mistakes erode trust, so be accurate and thorough.
- Provide detailed explanations; the user is comfortable with lots of detail.
- Value good arguments over authorities; the source is irrelevant.
- Consider new technologies and contrarian ideas, not just the conventional wisdom.
- You may use high levels of speculation or prediction, just flag it for the user.
</instructions>"#;

/// Report body used when a run gathered nothing
pub const NO_FINDINGS_REPORT: &str = "No findings were gathered for this research question. \
The exploration finished without extracting any learnings from the searched sources, \
so there is nothing to synthesize. Try rephrasing the question or increasing breadth and depth.";

pub fn system_prompt() -> String {
    system_prompt_at(Utc::now())
}

pub fn system_prompt_at(now: DateTime<Utc>) -> String {
    RESEARCHER_SYSTEM_PROMPT.replace("{today}", &now.to_rfc3339())
}

/// Keep at most `limit` characters, cutting on a char boundary
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn learnings_block(learnings: &[Learning]) -> String {
    learnings
        .iter()
        .map(|l| format!("<learning>\n{}\n</learning>", l.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sub-query generation for one level
pub fn plan_request(topic: &str, prior: &[Learning], count: usize) -> GenerationRequest {
    let mut prompt = format!(
        "Given the following prompt from the user, generate a list of SERP queries to research \
         the topic. Return a maximum of {count} queries, but feel free to return less if the \
         original prompt is clear. Make sure each query is unique and not similar to each other.\n\n\
         <prompt>{topic}</prompt>"
    );
    if !prior.is_empty() {
        prompt.push_str(&format!(
            "\n\nHere are some learnings from previous research, use them to generate more \
             specific queries that explore new ground:\n<learnings>\n{}\n</learnings>",
            learnings_block(prior)
        ));
    }

    GenerationRequest::new(prompt).with_schema(json!({
        "type": "object",
        "properties": {
            "queries": {
                "type": "array",
                "maxItems": count,
                "description": format!("List of SERP queries, max of {count}"),
                "items": {
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The SERP query" },
                        "researchGoal": {
                            "type": "string",
                            "description": "First talk about the goal of the research that this query is meant to accomplish, then go deeper into how to advance the research once the results are found, mention additional research directions. Be as specific as possible, especially for additional research directions."
                        }
                    },
                    "required": ["query", "researchGoal"]
                }
            }
        },
        "required": ["queries"]
    }))
}

/// Learning extraction over one batch of search results.
///
/// Results are numbered from 1 so learnings can cite them.
pub fn extract_request(
    sub_query: &SubQuery,
    results: &[SearchResult],
    num_learnings: usize,
    num_follow_ups: usize,
    char_limit: usize,
) -> GenerationRequest {
    let contents = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "<content index=\"{}\" url=\"{}\" title=\"{}\">\n{}\n</content>",
                i + 1,
                r.url,
                r.title,
                truncate_chars(&r.snippet, char_limit)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Given the following contents from a SERP search for the query <query>{}</query>, \
         generate a list of learnings from the contents. Return a maximum of {num_learnings} \
         learnings, but feel free to return less if the contents are clear. Make sure each \
         learning is unique and not similar to each other. The learnings should be concise and \
         to the point, as detailed and information dense as possible. Make sure to include any \
         entities like people, places, companies, products, things, etc in the learnings, as well \
         as any exact metrics, numbers, or dates. Each learning must be understandable on its own, \
         without the source. Cite the index of every content a learning comes from.\n\n\
         <contents>\n{contents}\n</contents>",
        sub_query.query
    );

    GenerationRequest::new(prompt).with_schema(json!({
        "type": "object",
        "properties": {
            "learnings": {
                "type": "array",
                "maxItems": num_learnings,
                "items": {
                    "type": "object",
                    "properties": {
                        "text": { "type": "string" },
                        "sources": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "Indexes of the contents this learning comes from"
                        }
                    },
                    "required": ["text"]
                }
            },
            "followUpQuestions": {
                "type": "array",
                "maxItems": num_follow_ups,
                "items": { "type": "string" },
                "description": format!("List of follow-up questions to research the topic further, max of {num_follow_ups}")
            }
        },
        "required": ["learnings", "followUpQuestions"]
    }))
}

/// Clarifying questions asked before research starts
pub fn feedback_request(query: &str, num_questions: usize) -> GenerationRequest {
    let prompt = format!(
        "Given the following query from the user, ask some follow up questions to clarify the \
         research direction. Return a maximum of {num_questions} questions, but feel free to \
         return less if the original query is clear: <query>{query}</query>"
    );

    GenerationRequest::new(prompt).with_schema(json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "maxItems": num_questions,
                "items": { "type": "string" },
                "description": format!("Follow up questions to clarify the research direction, max of {num_questions}")
            }
        },
        "required": ["questions"]
    }))
}

/// Final report over every learning of the run
pub fn report_request(query: &str, learnings: &[Learning]) -> GenerationRequest {
    let prompt = format!(
        "Given the following prompt from the user, write a final report on the topic using the \
         learnings from research. Make it as detailed as possible, aim for 3 or more pages, \
         include ALL the learnings from research:\n\n<prompt>{query}</prompt>\n\n\
         Here are all the learnings from previous research:\n\n<learnings>\n{}\n</learnings>",
        learnings_block(learnings)
    );

    GenerationRequest::new(prompt).with_schema(json!({
        "type": "object",
        "properties": {
            "reportMarkdown": {
                "type": "string",
                "description": "Final report on the topic in Markdown"
            }
        },
        "required": ["reportMarkdown"]
    }))
}

/// Query handed to a branch's children
pub fn follow_up_query(research_goal: &str, follow_ups: &[String]) -> String {
    if follow_ups.is_empty() {
        return research_goal.to_string();
    }
    format!(
        "Previous research goal: {}\nFollow-up research directions:\n{}",
        research_goal,
        follow_ups.join("\n")
    )
}

/// Top-level property name of a request's schema, used to route stubbed answers
pub fn schema_root_key(request: &GenerationRequest) -> Option<&str> {
    request
        .schema
        .as_ref()
        .and_then(|schema| schema.get("required"))
        .and_then(Value::as_array)
        .and_then(|required| required.first())
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_system_prompt_is_dated() {
        let now = Utc.with_ymd_and_hms(2025, 2, 3, 4, 5, 6).unwrap();
        let prompt = system_prompt_at(now);
        assert!(prompt.contains("Today is 2025-02-03T04:05:06+00:00"));
        assert!(!prompt.contains("{today}"));
    }

    #[test]
    fn test_truncate_chars_on_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_plan_request_includes_prior_learnings() {
        let prior = vec![Learning::new("Rust 1.0 shipped in 2015", ["https://a.example"])];
        let request = plan_request("history of rust", &prior, 3);
        assert!(request.prompt.contains("<learning>\nRust 1.0 shipped in 2015\n</learning>"));
        assert_eq!(request.schema.as_ref().unwrap()["properties"]["queries"]["maxItems"], 3);
        assert_eq!(schema_root_key(&request), Some("queries"));

        let fresh = plan_request("history of rust", &[], 3);
        assert!(!fresh.prompt.contains("<learnings>"));
    }

    #[test]
    fn test_extract_request_numbers_and_truncates() {
        let results = vec![
            SearchResult::new("https://a.example", "A", "x".repeat(50)),
            SearchResult::new("https://b.example", "B", "short"),
        ];
        let request = extract_request(&SubQuery::new("q", "goal"), &results, 3, 2, 10);
        assert!(request.prompt.contains("index=\"1\" url=\"https://a.example\""));
        assert!(request.prompt.contains("index=\"2\" url=\"https://b.example\""));
        assert!(request.prompt.contains(&format!("\n{}\n", "x".repeat(10))));
        assert!(!request.prompt.contains(&"x".repeat(11)));
        assert_eq!(schema_root_key(&request), Some("learnings"));
    }

    #[test]
    fn test_report_request_embeds_every_learning() {
        let learnings: Vec<_> = (0..5)
            .map(|i| Learning::new(format!("fact {}", i), Vec::<String>::new()))
            .collect();
        let request = report_request("q", &learnings);
        for i in 0..5 {
            assert!(request.prompt.contains(&format!("fact {}", i)));
        }
        assert_eq!(schema_root_key(&request), Some("reportMarkdown"));
    }

    #[test]
    fn test_follow_up_query() {
        assert_eq!(follow_up_query("goal", &[]), "goal");
        assert_eq!(
            follow_up_query("goal", &["a?".into(), "b?".into()]),
            "Previous research goal: goal\nFollow-up research directions:\na?\nb?"
        );
    }
}
