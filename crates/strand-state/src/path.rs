//! Paths into the run-state document.
//!
//! A path is an ordered sequence of segments, each either an object key or an
//! array index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step into a JSON document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object key access.
    Key(String),
    /// Array index access.
    Index(usize),
}

impl Seg {
    /// Create a key segment.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{k}"),
            Seg::Index(i) => write!(f, "[{i}]"),
        }
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A location in the run-state document.
///
/// The empty path is the document root. Builder methods append segments:
///
/// ```
/// use strand_state::Path;
///
/// let p = Path::root().key("messages").index(0).key("content");
/// assert_eq!(p.to_string(), "$.messages[0].content");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// The document root (empty path).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Append a key segment (builder).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment (builder).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// The segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// True when this path is the document root.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the path has no segments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenate two paths.
    #[inline]
    pub fn join(&self, other: &Path) -> Path {
        let mut out = self.clone();
        out.0.extend(other.0.iter().cloned());
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

/// Construct a [`Path`] from literal segments.
///
/// String literals become keys, integers become indices:
///
/// ```
/// use strand_state::path;
///
/// let p = path!("messages", 2, "content");
/// assert_eq!(p.to_string(), "$.messages[2].content");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}
