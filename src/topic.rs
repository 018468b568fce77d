//! Topic Matcher: tests a concrete MQTT-style topic against a pattern with
//! single-level (`+`) and multi-level (`#`) wildcards. Pure and total.

/// Returns `true` if `topic` matches `pattern`.
///
/// `+` matches exactly one `/`-separated level, any value, including an
/// empty one. `#` matches all remaining levels and is only meaningful as
/// the final token of the pattern; a `#` anywhere else makes the pattern
/// unmatchable rather than panicking, since validating pattern syntax is
/// out of scope for a matcher.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('/').collect();
    let topic_tokens: Vec<&str> = topic.split('/').collect();

    for (i, ptok) in pattern_tokens.iter().enumerate() {
        if *ptok == "#" {
            // '#' must be the last token to be meaningful.
            return i == pattern_tokens.len() - 1;
        }

        let Some(ttok) = topic_tokens.get(i) else {
            return false;
        };

        if *ptok == "+" {
            continue;
        }

        if ptok != ttok {
            return false;
        }
    }

    // No '#' consumed the rest: lengths must match exactly.
    pattern_tokens.len() == topic_tokens.len()
}
