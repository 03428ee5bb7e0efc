//! Origin allow-list

use std::collections::BTreeSet;

/// Set of origins allowed to use the relay
///
/// Matching is exact string membership. `"null"` is a legitimate entry: it is
/// what browsers send for pages opened from `file://`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins {
    origins: BTreeSet<String>,
}

impl AllowedOrigins {
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `origin` is in the set
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.contains(origin)
    }

    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowedOrigins {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Free-function form of [`AllowedOrigins::is_allowed`]
pub fn is_allowed(origin: &str, allowed: &AllowedOrigins) -> bool {
    allowed.is_allowed(origin)
}
