//! Subject namespacing.
//!
//! Users, groups and permissions share one flat identifier space inside the
//! policy engine. Each numeric id is prefixed with its kind, so `user::7` and
//! `group::7` never collide.
//!
//! # Examples
//!
//! ```
//! use authz_core::subject::{id_from, subject_for, SubjectKind};
//!
//! let s = subject_for(SubjectKind::Group, 42);
//! assert_eq!(s, "group::42");
//! assert_eq!(id_from(&s), 42);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Separator between the kind prefix and the numeric id.
pub const SEPARATOR: &str = "::";

/// The entity kind encoded in a subject prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// A user (`user::<id>`).
    User,
    /// A group (`group::<id>`).
    Group,
    /// A permission (`permission::<id>`).
    Permission,
}

impl SubjectKind {
    /// All kinds, in prefix order.
    pub const ALL: [SubjectKind; 3] = [Self::User, Self::Group, Self::Permission];

    /// The textual prefix for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Permission => "permission",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "permission" => Ok(Self::Permission),
            other => Err(Error::invalid_subject(
                other,
                "unknown kind (expected user, group or permission)",
            )),
        }
    }
}

/// A parsed, namespaced identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject {
    kind: SubjectKind,
    id: i32,
}

impl Subject {
    /// Creates a subject from a kind and id.
    pub fn new(kind: SubjectKind, id: i32) -> Self {
        Self { kind, id }
    }

    /// Creates a subject, rejecting negative ids which would not parse back.
    pub fn checked(kind: SubjectKind, id: i32) -> Result<Self> {
        if id < 0 {
            return Err(Error::invalid_subject(
                format!("{kind}{SEPARATOR}{id}"),
                "id must not be negative",
            ));
        }
        Ok(Self::new(kind, id))
    }

    /// A user subject.
    pub fn user(id: i32) -> Self {
        Self::new(SubjectKind::User, id)
    }

    /// A group subject.
    pub fn group(id: i32) -> Self {
        Self::new(SubjectKind::Group, id)
    }

    /// A permission subject.
    pub fn permission(id: i32) -> Self {
        Self::new(SubjectKind::Permission, id)
    }

    /// The entity kind.
    pub fn kind(&self) -> SubjectKind {
        self.kind
    }

    /// The numeric id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Parses `"<kind>::<id>"`.
    ///
    /// The id must be a non-empty run of ASCII digits that fits in `i32`.
    pub fn parse(subject: &str) -> Result<Self> {
        let (kind, id) = subject
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::invalid_subject(subject, "missing '::' separator"))?;

        let kind: SubjectKind = kind
            .parse()
            .map_err(|_| Error::invalid_subject(subject, format!("unknown kind '{kind}'")))?;

        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_subject(subject, "id is not a base-10 integer"));
        }
        let id = id
            .parse::<i32>()
            .map_err(|e| Error::invalid_subject(subject, e.to_string()))?;

        Ok(Self { kind, id })
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.kind, self.id)
    }
}

impl FromStr for Subject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.to_string()
    }
}

/// Formats `"<kind>::<id>"`.
pub fn subject_for(kind: SubjectKind, id: i32) -> String {
    Subject::new(kind, id).to_string()
}

/// Whether `subject` carries the `kind` prefix. Does not validate the id.
pub fn has_kind(subject: &str, kind: SubjectKind) -> bool {
    subject
        .strip_prefix(kind.as_str())
        .is_some_and(|rest| rest.starts_with(SEPARATOR))
}

/// Extracts the numeric id from a subject the system produced itself.
///
/// # Panics
///
/// Panics if the separator is missing, the kind is unknown or the suffix is
/// not a base-10 integer. Such strings never originate from this crate, so a
/// failure here is an invariant violation. Use [`Subject::parse`] for input
/// from outside the system.
#[allow(clippy::panic)]
pub fn id_from(subject: &str) -> i32 {
    match Subject::parse(subject) {
        Ok(parsed) => parsed.id,
        Err(e) => panic!("corrupt namespaced identifier: {e}"),
    }
}
