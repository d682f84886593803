use regex::Regex;

use crate::filter::Rejection;
use crate::policy::TitlePolicy;

/// Evaluate the title keyword gates. `None` means the title passes.
///
/// Matching is case-insensitive on word boundaries, so an excluded "java"
/// does not reject "JavaScript Engineer". An empty title always rejects.
pub fn title_filter(title: &str, policy: &TitlePolicy) -> Option<Rejection> {
    if title.trim().is_empty() {
        return Some(Rejection::hard("title_empty"));
    }

    for keyword in &policy.excluded_keywords {
        if keyword_matches(title, keyword) {
            return Some(Rejection::hard(format!("title_excluded:{keyword}")));
        }
    }

    if !policy.required_keywords.is_empty()
        && !policy
            .required_keywords
            .iter()
            .any(|keyword| keyword_matches(title, keyword))
    {
        return Some(Rejection::hard("title_missing_required_keyword"));
    }

    None
}

/// Case-insensitive word-boundary match of a keyword (possibly multi-word)
/// inside free text.
///
/// `\b` is only anchored where the keyword edge is itself a word character,
/// so keywords like "c++" still match ("\b" next to '+' can never match).
pub(crate) fn keyword_matches(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return false;
    }
    let starts_word = keyword
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');
    let ends_word = keyword
        .chars()
        .last()
        .is_some_and(|c| c.is_alphanumeric() || c == '_');
    let pattern = format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(keyword),
        if ends_word { r"\b" } else { "" },
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => text.to_lowercase().contains(&keyword.to_lowercase()),
    }
}
