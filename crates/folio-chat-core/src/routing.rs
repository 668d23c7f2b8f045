//! The chat routing state machine.
//!
//! A chat turn walks a fixed graph of four agent nodes:
//!
//! ```text
//!                  ┌──────────────────┐
//!          ┌──────▶│ RepoInvestigator │──────┐
//!          │       └──────────────────┘      ▼
//! ┌──────────────┐                    ┌───────────────────┐
//! │ Orchestrator │───────────────────▶│ ResponseGenerator │──▶ End
//! └──────────────┘                    └───────────────────┘
//!          │       ┌──────────────────┐      ▲
//!          └──────▶│  BlogExplainer   │──────┘
//!                  └──────────────────┘
//! ```
//!
//! Transitions are table-driven ([`allowed_routes`]). Every node consumes a
//! [`ConversationState`] and produces a new one with the next hop set; the
//! state itself is never mutated in place.

use anyhow::{bail, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::models::{ChatMessage, Role};

/// The agent nodes of the chat graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Orchestrator,
    RepoInvestigator,
    BlogExplainer,
    ResponseGenerator,
}

impl NodeKind {
    /// Node every turn starts at.
    pub const ENTRY: NodeKind = NodeKind::Orchestrator;

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Orchestrator => "orchestrator",
            NodeKind::RepoInvestigator => "repo_investigator",
            NodeKind::BlogExplainer => "blog_explainer",
            NodeKind::ResponseGenerator => "response_generator",
        }
    }

    /// Whether this node gathers context for the final reply.
    pub fn is_specialist(&self) -> bool {
        matches!(self, NodeKind::RepoInvestigator | NodeKind::BlogExplainer)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routing decision: the next node to run, or the terminal signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RepoInvestigator,
    BlogExplainer,
    ResponseGenerator,
    End,
}

impl Route {
    /// The node this route leads to, `None` for [`Route::End`].
    pub fn target(&self) -> Option<NodeKind> {
        match self {
            Route::RepoInvestigator => Some(NodeKind::RepoInvestigator),
            Route::BlogExplainer => Some(NodeKind::BlogExplainer),
            Route::ResponseGenerator => Some(NodeKind::ResponseGenerator),
            Route::End => None,
        }
    }
}

/// Outgoing edges of each node.
pub fn allowed_routes(from: NodeKind) -> &'static [Route] {
    match from {
        NodeKind::Orchestrator => &[
            Route::RepoInvestigator,
            Route::BlogExplainer,
            Route::ResponseGenerator,
        ],
        NodeKind::RepoInvestigator | NodeKind::BlogExplainer => &[Route::ResponseGenerator],
        NodeKind::ResponseGenerator => &[Route::End],
    }
}

/// Resolve the node that follows `from` when it emitted `route`.
///
/// Returns `Ok(None)` when the graph ends, and an error for an edge the table
/// does not contain.
pub fn next_node(from: NodeKind, route: Route) -> Result<Option<NodeKind>> {
    if !allowed_routes(from).contains(&route) {
        bail!("no edge from {} via {:?}", from, route);
    }
    Ok(route.target())
}

/// Result of parsing the classifier's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Parsed(Route),
    ParseFailed { reason: String },
}

impl RouteDecision {
    /// The route to follow. Parse failures fall back to the response generator.
    pub fn route(&self) -> Route {
        match self {
            RouteDecision::Parsed(route) => *route,
            RouteDecision::ParseFailed { .. } => Route::ResponseGenerator,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, RouteDecision::Parsed(_))
    }
}

/// Strip a surrounding Markdown code fence (```` ```lang ... ``` ````) if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a single-label classifier answer into a route.
///
/// The answer is matched loosely: any label containing `REPO` selects the
/// repo investigator, `BLOG` the blog explainer, and `RESPONSE` or `GENERAL`
/// the response generator. Anything else is a parse failure.
pub fn parse_route(raw: &str) -> RouteDecision {
    let label = strip_code_fences(raw).to_uppercase();
    if label.is_empty() {
        return RouteDecision::ParseFailed {
            reason: "empty classifier response".to_string(),
        };
    }
    if label.contains("REPO") {
        RouteDecision::Parsed(Route::RepoInvestigator)
    } else if label.contains("BLOG") {
        RouteDecision::Parsed(Route::BlogExplainer)
    } else if label.contains("RESPONSE") || label.contains("GENERAL") {
        RouteDecision::Parsed(Route::ResponseGenerator)
    } else {
        RouteDecision::ParseFailed {
            reason: format!("unrecognized routing label {:?}", raw.trim()),
        }
    }
}

/// State threaded through the graph for one chat turn.
///
/// Built fresh per inbound message from caller history plus the new message.
/// Nodes return new values via [`advance`](Self::advance); the route is set
/// exactly once per hop and the scratch output is replaced, never appended.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
    history: Vec<ChatMessage>,
    route: Option<Route>,
    scratch: String,
}

impl ConversationState {
    /// Build the state for a new inbound `message` following `history`.
    pub fn new(message: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        let mut messages = history.clone();
        messages.push(ChatMessage::user(message));
        Self {
            messages,
            history,
            route: None,
            scratch: String::new(),
        }
    }

    /// Build a state from an arbitrary message sequence (which may lack a
    /// user turn entirely).
    pub fn from_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            history: messages.clone(),
            messages,
            route: None,
            scratch: String::new(),
        }
    }

    /// All turns, the inbound message last.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Caller-supplied history, unchanged.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn route(&self) -> Option<Route> {
        self.route
    }

    /// Output of the most recent specialist (empty if none ran).
    pub fn scratch(&self) -> &str {
        &self.scratch
    }

    /// Content of the last user turn, unless it is blank.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .filter(|c| !c.trim().is_empty())
    }

    /// Every turn except the last one.
    pub fn prior_turns(&self) -> &[ChatMessage] {
        match self.messages.split_last() {
            Some((_, prior)) => prior,
            None => &[],
        }
    }

    /// Produce the next hop's state: `route` set, scratch replaced when
    /// `output` is given.
    pub fn advance(&self, route: Route, output: Option<String>) -> Self {
        Self {
            messages: self.messages.clone(),
            history: self.history.clone(),
            route: Some(route),
            scratch: output.unwrap_or_else(|| self.scratch.clone()),
        }
    }
}

fn project_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(
                r#"\b(?:in|about|for|from)\s+['"]?(\w+[-_]?\w*)['"]?\s*(?:project|repo|repository)?"#,
            )
            .expect("project pattern is valid"),
            Regex::new(r#"['"]?(\w+[-_]?\w*)['"]?\s+(?:project|repo|repository)\b"#)
                .expect("project pattern is valid"),
        ]
    })
}

/// Pick the indexed project a question is about, if any.
///
/// First tries a case-insensitive substring match of each known project name
/// against the question, then falls back to phrase patterns such as
/// `"in foo"` or `"foo repo"` whose captured word overlaps a project name.
pub fn extract_project_name<'a, I>(question: &str, projects: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let question = question.to_lowercase();
    let projects: Vec<&String> = projects.into_iter().filter(|p| !p.is_empty()).collect();

    if let Some(project) = projects
        .iter()
        .find(|p| question.contains(&p.to_lowercase()))
    {
        return Some((*project).clone());
    }

    for pattern in project_patterns() {
        let Some(caps) = pattern.captures(&question) else {
            continue;
        };
        let Some(candidate) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        if let Some(project) = projects.iter().find(|p| {
            let lower = p.to_lowercase();
            lower.contains(candidate) || candidate.contains(&lower)
        }) {
            return Some((*project).clone());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        assert_eq!(
            next_node(NodeKind::Orchestrator, Route::BlogExplainer).unwrap(),
            Some(NodeKind::BlogExplainer)
        );
        assert_eq!(
            next_node(NodeKind::RepoInvestigator, Route::ResponseGenerator).unwrap(),
            Some(NodeKind::ResponseGenerator)
        );
        assert_eq!(next_node(NodeKind::ResponseGenerator, Route::End).unwrap(), None);
    }

    #[test]
    fn test_specialists_cannot_end_or_chain() {
        assert!(next_node(NodeKind::RepoInvestigator, Route::End).is_err());
        assert!(next_node(NodeKind::BlogExplainer, Route::RepoInvestigator).is_err());
        assert!(next_node(NodeKind::Orchestrator, Route::End).is_err());
    }

    #[test]
    fn test_parse_route_labels() {
        assert_eq!(
            parse_route("REPO_INVESTIGATOR"),
            RouteDecision::Parsed(Route::RepoInvestigator)
        );
        assert_eq!(
            parse_route("  blog_explainer\n"),
            RouteDecision::Parsed(Route::BlogExplainer)
        );
        assert_eq!(
            parse_route("RESPONSE_GENERATOR"),
            RouteDecision::Parsed(Route::ResponseGenerator)
        );
        assert_eq!(
            parse_route("```\nREPO_INVESTIGATOR\n```"),
            RouteDecision::Parsed(Route::RepoInvestigator)
        );
    }

    #[test]
    fn test_parse_route_failure_records_reason() {
        let decision = parse_route("I am not sure");
        assert!(!decision.is_parsed());
        assert_eq!(decision.route(), Route::ResponseGenerator);
        match decision {
            RouteDecision::ParseFailed { reason } => assert!(reason.contains("I am not sure")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(matches!(
            parse_route("   "),
            RouteDecision::ParseFailed { .. }
        ));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```text\nBLOG\n```"), "BLOG");
        assert_eq!(strip_code_fences("plain"), "plain");
    }

    #[test]
    fn test_state_advance_is_write_once_per_hop() {
        let state = ConversationState::new("hi", vec![ChatMessage::assistant("hello")]);
        assert_eq!(state.route(), None);
        assert_eq!(state.messages().len(), 2);
        assert_eq!(state.prior_turns().len(), 1);

        let routed = state.advance(Route::RepoInvestigator, None);
        assert_eq!(state.route(), None);
        assert_eq!(routed.route(), Some(Route::RepoInvestigator));

        let first = routed.advance(Route::ResponseGenerator, Some("a".into()));
        let second = first.advance(Route::End, Some("b".into()));
        assert_eq!(first.scratch(), "a");
        assert_eq!(second.scratch(), "b");

        let kept = first.advance(Route::End, None);
        assert_eq!(kept.scratch(), "a");
    }

    #[test]
    fn test_last_user_message_skips_assistant_turns() {
        let state = ConversationState::from_messages(vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
        ]);
        assert_eq!(state.last_user_message(), Some("first"));

        let none = ConversationState::from_messages(vec![ChatMessage::assistant("only me")]);
        assert_eq!(none.last_user_message(), None);
        assert!(ConversationState::from_messages(vec![]).prior_turns().is_empty());
    }

    #[test]
    fn test_extract_project_by_substring() {
        let projects = vec!["kamin-ai".to_string(), "tokenizer".to_string()];
        assert_eq!(
            extract_project_name("What does the lexer in Tokenizer do?", &projects),
            Some("tokenizer".to_string())
        );
    }

    #[test]
    fn test_extract_project_by_pattern() {
        let projects = vec!["rusty_parser".to_string()];
        assert_eq!(
            extract_project_name("tell me about parser project", &projects),
            Some("rusty_parser".to_string())
        );
        assert_eq!(extract_project_name("hello there", &projects), None);
    }

    #[test]
    fn test_extract_project_keywords_need_word_boundaries() {
        let projects = vec!["weather-app".to_string()];
        // "in" inside "explain" must not capture "the".
        assert_eq!(extract_project_name("can you explain the setup?", &projects), None);
        assert_eq!(extract_project_name("what are you reporting on?", &projects), None);
        assert_eq!(
            extract_project_name("anything new about weather?", &projects),
            Some("weather-app".to_string())
        );
    }

    #[test]
    fn test_extract_project_ignores_empty_names() {
        let projects = vec![String::new()];
        assert_eq!(extract_project_name("anything", &projects), None);
    }
}
