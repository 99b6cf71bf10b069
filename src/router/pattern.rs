//! Route template compilation.
//!
//! | Template                  | Compiles to                       | `/users/42/posts/7` captures |
//! |---------------------------|-----------------------------------|------------------------------|
//! | `/users`                  | [`Pattern::Static`]               | *(no match)*                 |
//! | `/users/:id`              | [`Pattern::Dynamic`] `["id"]`     | *(no match)*                 |
//! | `/users/:id/posts/:post`  | [`Pattern::Dynamic`] `["id", "post"]` | `id → 42`, `post → 7`   |
//!
//! A parameter marker is `:` followed by at least one character other than `/`; it
//! captures the rest of its segment. Text before the marker in the same segment is a
//! literal prefix (`/v:version` matches `/v2`). A `:` with nothing after it is plain
//! text. Matching is anchored: the path must have exactly as many `/`-separated
//! segments as the template and every capture must be non-empty. No trailing-slash
//! normalization takes place.

use crate::context::Parameters;

/// One `/`-separated piece of a dynamic template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Capture { prefix: String, name: String },
}

impl Segment {
    fn parse(raw: &str) -> Self {
        let marker = raw
            .char_indices()
            .find(|&(i, c)| c == ':' && i + 1 < raw.len());

        match marker {
            Some((i, _)) => Segment::Capture {
                prefix: raw[..i].to_owned(),
                name: raw[i + 1..].to_owned(),
            },
            None => Segment::Literal(raw.to_owned()),
        }
    }

    fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }
}

/// A compiled route template.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// No parameter markers: the template is matched by string equality.
    Static(String),
    /// At least one marker: segment-wise matcher plus the ordered parameter names.
    Dynamic {
        segments: Vec<Segment>,
        names: Vec<String>,
    },
}

impl Pattern {
    /// Compiles `template`.
    ///
    /// A template without markers takes the static fast path and is never turned into
    /// a matcher.
    ///
    /// # Examples
    ///
    /// ```
    /// use pathway::router::Pattern;
    ///
    /// assert!(Pattern::compile("/health").is_static());
    ///
    /// let pattern = Pattern::compile("/users/:id/posts/:postId");
    /// assert_eq!(pattern.param_names(), ["id", "postId"]);
    ///
    /// let params = pattern.matches("/users/7/posts/99").unwrap();
    /// assert_eq!(params.get("postId"), Some("99"));
    /// ```
    pub fn compile(template: &str) -> Self {
        let segments: Vec<Segment> = template.split('/').map(Segment::parse).collect();

        if segments.iter().all(Segment::is_literal) {
            return Pattern::Static(template.to_owned());
        }

        let names = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Capture { name, .. } => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect();

        Pattern::Dynamic { segments, names }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, Pattern::Static(_))
    }

    /// Parameter names in template order; empty for static patterns.
    pub fn param_names(&self) -> &[String] {
        match self {
            Pattern::Static(_) => &[],
            Pattern::Dynamic { names, .. } => names,
        }
    }

    /// Matches `path` against the whole pattern, returning the captured parameters.
    ///
    /// When a name appears twice in one template the later capture wins.
    pub fn matches(&self, path: &str) -> Option<Parameters> {
        let segments = match self {
            Pattern::Static(template) => return (template == path).then(Parameters::new),
            Pattern::Dynamic { segments, .. } => segments,
        };

        let mut params = Parameters::new();
        let mut parts = path.split('/');

        for segment in segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Capture { prefix, name } => {
                    let value = part.strip_prefix(prefix.as_str())?;
                    if value.is_empty() {
                        return None;
                    }
                    params.insert(name.as_str(), value);
                }
            }
        }

        if parts.next().is_some() {
            return None;
        }

        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Pattern::compile ──────────────────────────────────────────────────────

    #[test]
    fn compile_root_is_static() {
        assert!(matches!(Pattern::compile("/"), Pattern::Static(s) if s == "/"));
    }

    #[test]
    fn compile_without_markers_is_static() {
        assert!(matches!(
            Pattern::compile("/api/v1/users"),
            Pattern::Static(s) if s == "/api/v1/users"
        ));
    }

    #[test]
    fn compile_keeps_trailing_slash() {
        assert!(matches!(Pattern::compile("/users/"), Pattern::Static(s) if s == "/users/"));
    }

    #[test]
    fn compile_single_marker() {
        match Pattern::compile("/users/:id") {
            Pattern::Dynamic { segments, names } => {
                assert_eq!(names, vec!["id"]);
                assert_eq!(segments.len(), 3);
                assert_eq!(segments[1], Segment::Literal("users".into()));
                assert_eq!(
                    segments[2],
                    Segment::Capture {
                        prefix: String::new(),
                        name: "id".into()
                    }
                );
            }
            other => panic!("expected Dynamic, got {other:?}"),
        }
    }

    #[test]
    fn compile_marker_with_literal_prefix() {
        match Pattern::compile("/api/v:version") {
            Pattern::Dynamic { segments, names } => {
                assert_eq!(names, vec!["version"]);
                assert_eq!(
                    segments[2],
                    Segment::Capture {
                        prefix: "v".into(),
                        name: "version".into()
                    }
                );
            }
            other => panic!("expected Dynamic, got {other:?}"),
        }
    }

    #[test]
    fn bare_colon_is_literal() {
        assert!(Pattern::compile("/time/12:").is_static());
    }

    // ── Pattern::matches ──────────────────────────────────────────────────────

    #[test]
    fn static_match_is_exact() {
        let pat = Pattern::compile("/users");
        assert!(pat.matches("/users").is_some());
        assert!(pat.matches("/users/").is_none());
        assert!(pat.matches("/Users").is_none());
    }

    #[test]
    fn param_extracts_value() {
        let params = Pattern::compile("/users/:id").matches("/users/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn param_requires_a_segment() {
        let pat = Pattern::compile("/users/:id");
        assert!(pat.matches("/users").is_none());
        assert!(pat.matches("/users/").is_none());
        assert!(pat.matches("/users/42/").is_none());
        assert!(pat.matches("/users/42/extra").is_none());
    }

    #[test]
    fn param_wrong_literal_segment() {
        assert!(Pattern::compile("/users/:id").matches("/posts/42").is_none());
    }

    #[test]
    fn prefixed_capture_strips_prefix() {
        let pat = Pattern::compile("/api/v:version/status");
        let params = pat.matches("/api/v2/status").unwrap();
        assert_eq!(params.get("version"), Some("2"));
        assert!(pat.matches("/api/2/status").is_none());
        assert!(pat.matches("/api/v/status").is_none());
    }

    #[test]
    fn capture_takes_rest_of_segment() {
        let params = Pattern::compile("/files/:name.json")
            .matches("/files/report.json")
            .unwrap();
        assert_eq!(params.get("name.json"), Some("report.json"));
    }

    #[test]
    fn duplicate_names_keep_last_capture() {
        let params = Pattern::compile("/pair/:x/:x").matches("/pair/1/2").unwrap();
        assert_eq!(params.get("x"), Some("2"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn captures_equal_param_names() {
        let pat = Pattern::compile("/a/:b/c/:d/:e");
        assert_eq!(pat.param_names().len(), 3);
        assert_eq!(pat.matches("/a/1/c/2/3").unwrap().len(), 3);
    }
}
