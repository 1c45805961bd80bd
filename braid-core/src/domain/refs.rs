// braid-core/src/domain/refs.rs
//
// Dependency-reference extraction from change-request descriptions.
// Recognized spellings: `Depends-on:`/`Depends:`/`Requires:` lists and the
// forge link keywords `Closes`/`Fixes`/`Resolves`. Normalized form is `#N`
// for same-repo references and `owner/repo#N` for qualified ones.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

#[allow(clippy::unwrap_used)] // literal pattern, cannot fail
fn list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*(?:depends-on|depends|requires)\s*:\s*(.+)$").unwrap())
}

#[allow(clippy::unwrap_used)] // literal pattern, cannot fail
fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:closes|fixes|resolves)\s*:?\s+((?:[\w.-]+/)?[\w.-]*#\d+|PR-\d+)")
            .unwrap()
    })
}

/// Extracts every dependency reference from a PR body, normalized, sorted
/// and deduplicated.
pub fn parse_dependency_refs(body: &str) -> Vec<String> {
    let mut refs: BTreeSet<String> = BTreeSet::new();

    for captures in list_re().captures_iter(body) {
        if let Some(list) = captures.get(1) {
            for token in list.as_str().split(',') {
                if let Some(normalized) = normalize_ref(token.trim()) {
                    refs.insert(normalized);
                }
            }
        }
    }

    for captures in link_re().captures_iter(body) {
        if let Some(token) = captures.get(1) {
            if let Some(normalized) = normalize_ref(token.as_str()) {
                refs.insert(normalized);
            }
        }
    }

    refs.into_iter().collect()
}

/// Normalizes one reference token.
///
/// `#N` and `PR-N` → `#N`; `owner/repo#N` is preserved; a bare `repo#N`
/// collapses to `#N` (the single-repo normal form keeps only the number).
pub fn normalize_ref(token: &str) -> Option<String> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    if let Some(number) = token.strip_prefix("PR-") {
        if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) {
            return Some(format!("#{number}"));
        }
        return None;
    }

    let (prefix, number) = token.rsplit_once('#')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if prefix.is_empty() {
        return Some(format!("#{number}"));
    }
    if prefix.contains('/') {
        return Some(format!("{prefix}#{number}"));
    }
    // bare repo qualifier: same-owner shorthand, single-repo normal form
    Some(format!("#{number}"))
}

/// Item-level overrides declared as YAML front matter before the first
/// `---` delimiter of a PR body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FrontMatter {
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub skip: Vec<String>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl FrontMatter {
    pub fn is_empty(&self) -> bool {
        self.priority.is_none()
            && self.labels.is_empty()
            && self.skip.is_empty()
            && self.required.is_empty()
    }
}

/// Parses the YAML that precedes the first `---` line, if any. A body
/// opening with `---` uses the conventional fenced form instead (YAML
/// between the first and second delimiters). Prose that fails to parse as
/// a mapping is simply not front matter.
pub fn parse_front_matter(body: &str) -> Option<FrontMatter> {
    let block = front_matter_block(body)?;
    let parsed: FrontMatter = serde_yaml::from_str(block).ok()?;
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

fn front_matter_block(body: &str) -> Option<&str> {
    let mut offset = 0;
    let mut first_delim: Option<(usize, usize)> = None;

    for line in body.split_inclusive('\n') {
        if line.trim_end() == "---" {
            first_delim = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let (start, end) = first_delim?;

    if body[..start].trim().is_empty() {
        // fenced form: everything up to the closing delimiter
        let rest = &body[end..];
        let mut inner_end = rest.len();
        let mut inner_offset = 0;
        for line in rest.split_inclusive('\n') {
            if line.trim_end() == "---" {
                inner_end = inner_offset;
                break;
            }
            inner_offset += line.len();
        }
        Some(&rest[..inner_end])
    } else {
        Some(&body[..start])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_normalized_sorted_deduplicated() {
        let body = "Depends-on: #123, owner/repo#45\nCloses #7";
        assert_eq!(
            parse_dependency_refs(body),
            vec!["#123".to_string(), "#7".to_string(), "owner/repo#45".to_string()]
        );
    }

    #[test]
    fn test_all_keywords_recognized() {
        let body = "Depends: PR-3\nRequires: repo#9\nFixes #2\nResolves owner/x#8";
        assert_eq!(
            parse_dependency_refs(body),
            vec!["#2".to_string(), "#3".to_string(), "#9".to_string(), "owner/x#8".to_string()]
        );
    }

    #[test]
    fn test_duplicates_collapse() {
        let body = "Depends-on: #5, PR-5\nCloses #5";
        assert_eq!(parse_dependency_refs(body), vec!["#5".to_string()]);
    }

    #[test]
    fn test_garbage_tokens_ignored() {
        assert_eq!(normalize_ref("not-a-ref"), None);
        assert_eq!(normalize_ref("#"), None);
        assert_eq!(normalize_ref("PR-"), None);
        assert_eq!(normalize_ref("owner/repo#x"), None);
        assert_eq!(parse_dependency_refs("Depends-on: banana, #1"), vec!["#1".to_string()]);
    }

    #[test]
    fn test_front_matter_before_first_delimiter() {
        let body = "priority: 2\nlabels: [infra]\nskip: [lint]\n---\nActual description";
        let fm = parse_front_matter(body).unwrap();
        assert_eq!(fm.priority, Some(2));
        assert_eq!(fm.labels, vec!["infra".to_string()]);
        assert_eq!(fm.skip, vec!["lint".to_string()]);
    }

    #[test]
    fn test_fenced_front_matter() {
        let body = "---\nrequired: [test]\n---\nDescription text";
        let fm = parse_front_matter(body).unwrap();
        assert_eq!(fm.required, vec!["test".to_string()]);
    }

    #[test]
    fn test_prose_is_not_front_matter() {
        assert_eq!(parse_front_matter("Just a description\nwith lines"), None);
        assert_eq!(parse_front_matter("Intro prose\n---\nmore prose"), None);
    }
}
