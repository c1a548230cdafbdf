//! Error taxonomy shared by the engine, the runner and the C boundary.
//!
//! Every fault that crosses the engine boundary is converted into a
//! [`RunnerError`]; nothing is swallowed or replaced by a default value.

use std::fmt;

pub type Result<T> = std::result::Result<T, RunnerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub col: usize,
}

impl SourceLocation {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    LibraryNotFound { name: String },
    UnknownIdentifier { name: String },
    EngineFault { message: String },
    InvalidArgument { message: String },
    Syntax { message: String },
    CircularDependency { chain: Vec<String> },
}

impl ErrorKind {
    /// Status code reported across the C boundary.
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => -1,
            Self::LibraryNotFound { .. } => -2,
            Self::UnknownIdentifier { .. } => -3,
            Self::EngineFault { .. } | Self::Syntax { .. } | Self::CircularDependency { .. } => -4,
        }
    }

    /// Short machine-friendly name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LibraryNotFound { .. } => "LibraryNotFound",
            Self::UnknownIdentifier { .. } => "UnknownIdentifier",
            Self::EngineFault { .. } => "EngineFault",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::Syntax { .. } => "Syntax",
            Self::CircularDependency { .. } => "CircularDependency",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryNotFound { name } => write!(f, "Library not found: {}", name),
            Self::UnknownIdentifier { name } => write!(f, "Unknown identifier: {}", name),
            Self::EngineFault { message } => write!(f, "Engine fault: {}", message),
            Self::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
            Self::Syntax { message } => write!(f, "Syntax error: {}", message),
            Self::CircularDependency { chain } => {
                write!(f, "Circular dependency: {}", chain.join(" -> "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerError {
    pub kind: ErrorKind,
    pub location: Option<SourceLocation>,
    pub suggestions: Vec<String>,
}

impl RunnerError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            location: None,
            suggestions: Vec::new(),
        }
    }

    pub fn library_not_found(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::LibraryNotFound { name: name.into() })
    }

    pub fn unknown_identifier(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownIdentifier { name: name.into() })
    }

    /// Unknown identifier with "did you mean" hints drawn from `candidates`.
    pub fn unknown_with_candidates<'a, I>(name: &str, candidates: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let similar = find_similar_names(name, candidates, 2);
        let suggestions = similar
            .into_iter()
            .take(3)
            .map(|s| format!("Did you mean '{}'?", s))
            .collect();
        Self::unknown_identifier(name).with_suggestions(suggestions)
    }

    pub fn engine_fault(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EngineFault {
            message: message.into(),
        })
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument {
            message: message.into(),
        })
    }

    pub fn syntax(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::new(ErrorKind::Syntax {
            message: message.into(),
        })
        .with_location(location)
    }

    pub fn circular(chain: Vec<String>) -> Self {
        Self::new(ErrorKind::CircularDependency { chain })
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn status_code(&self) -> i32 {
        self.kind.status_code()
    }

    pub fn is_unknown_identifier(&self) -> bool {
        matches!(self.kind, ErrorKind::UnknownIdentifier { .. })
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{}", self.kind)?;

        for suggestion in &self.suggestions {
            write!(f, "\n  hint: {}", suggestion)?;
        }

        Ok(())
    }
}

impl std::error::Error for RunnerError {}

/// Compute Levenshtein distance for "did you mean" suggestions
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Names within `max_distance` edits of `target`, closest first.
pub fn find_similar_names<'a, I>(target: &str, candidates: I, max_distance: usize) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut results: Vec<(&str, usize)> = candidates
        .into_iter()
        .map(|c| (c, levenshtein_distance(target, c)))
        .filter(|(_, dist)| *dist <= max_distance && *dist > 0)
        .collect();

    results.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    results.dedup_by(|a, b| a.0 == b.0);
    results.into_iter().map(|(name, _)| name.to_string()).collect()
}
