// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! Deterministic, rule-based rolling-summary compactor (spec §4.5, §9).
//! No model call is made: identical input always produces identical
//! output, the same guarantee the teacher's `emergency_compact` gives for
//! its own bounded-length, no-model-call fallback path.

/// Hard cap on the rendered summary's length in characters. Oldest bullet
/// facts are dropped first when the bound is exceeded; the newest
/// "Last turn" line is always kept.
pub const MAX_SUMMARY_CHARS: usize = 2000;

/// Maximum number of bullet facts retained under "## Key facts".
const MAX_FACTS: usize = 20;

/// Produce the next rolling summary from the previous one plus one
/// completed turn. Bounded length, stable under repeated calls.
pub fn append_summary(previous: &str, user_text: &str, assistant_text: &str) -> String {
    let mut facts = parse_facts(previous);
    facts.push(make_fact(user_text, assistant_text));
    while facts.len() > MAX_FACTS {
        facts.remove(0);
    }

    let last_turn = make_last_turn_line(user_text, assistant_text);
    let mut rendered = render(&last_turn, &facts);

    while rendered.len() > MAX_SUMMARY_CHARS && !facts.is_empty() {
        facts.remove(0);
        rendered = render(&last_turn, &facts);
    }

    if rendered.len() > MAX_SUMMARY_CHARS {
        rendered.truncate(MAX_SUMMARY_CHARS);
    }

    rendered
}

fn make_last_turn_line(user_text: &str, assistant_text: &str) -> String {
    format!("- user: {} / assistant: {}", one_line(user_text), one_line(assistant_text))
}

fn make_fact(user_text: &str, assistant_text: &str) -> String {
    format!("- {} -> {}", one_line(user_text), one_line(assistant_text))
}

fn one_line(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    const MAX: usize = 160;
    if collapsed.chars().count() > MAX {
        let truncated: String = collapsed.chars().take(MAX).collect();
        format!("{truncated}…")
    } else {
        collapsed
    }
}

fn render(last_turn: &str, facts: &[String]) -> String {
    let mut out = String::new();
    out.push_str("## Last turn\n");
    out.push_str(last_turn);
    out.push('\n');
    out.push_str("\n## Key facts\n");
    if facts.is_empty() {
        out.push_str("(none)\n");
    } else {
        for f in facts {
            out.push_str(f);
            out.push('\n');
        }
    }
    out
}

/// Parse the "## Key facts" bullet list back out of a previously rendered
/// summary, so it can be carried forward and appended to.
fn parse_facts(summary: &str) -> Vec<String> {
    let Some(idx) = summary.find("## Key facts") else {
        return Vec::new();
    };
    summary[idx..]
        .lines()
        .skip(1)
        .filter(|l| l.starts_with("- "))
        .map(|l| l.to_string())
        .collect()
}
