//! Typed policy facts.
//!
//! The engine stores two kinds of facts:
//!
//! - `p`: a permission grant `(subject, object, action)`
//! - `g`: a role edge `(user, group)`
//!
//! Each kind has a fixed field count. The textual *fact line* form,
//! `p, group::1, permission::2, read`, is what storage backends reconstruct
//! from their rows and hand to [`Fact::parse_line`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::subject::Subject;
use crate::{Error, Result};

/// Separator used when rendering a fact line.
pub const LINE_SEPARATOR: &str = ", ";

/// Fact kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FactKind {
    /// Permission grant (`p`).
    #[serde(rename = "p")]
    Policy,
    /// Group membership / role edge (`g`).
    #[serde(rename = "g")]
    Role,
}

impl FactKind {
    /// Both kinds, grants first.
    pub const ALL: [FactKind; 2] = [Self::Policy, Self::Role];

    /// The kind tag as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Policy => "p",
            Self::Role => "g",
        }
    }

    /// Number of fields a fact of this kind carries.
    pub fn arity(&self) -> usize {
        match self {
            Self::Policy => 3,
            Self::Role => 2,
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "p" => Ok(Self::Policy),
            "g" => Ok(Self::Role),
            other => Err(Error::invalid_fact(format!("unknown fact kind '{other}'"))),
        }
    }
}

/// A permission grant: `subject` may perform `action` on `object`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyFact {
    /// Grantee (normally a group subject).
    pub subject: String,
    /// Protected object (a permission subject).
    pub object: String,
    /// Action allowed on the object.
    pub action: String,
}

impl PolicyFact {
    /// Creates a permission grant.
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
        }
    }
}

/// A role edge: `user` is a member of `group`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleFact {
    /// Member subject.
    pub user: String,
    /// Role (group) subject.
    pub group: String,
}

impl RoleFact {
    /// Creates a role edge.
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }
}

/// One fact of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fact {
    /// Permission grant.
    Policy(PolicyFact),
    /// Role edge.
    Role(RoleFact),
}

impl Fact {
    /// Shorthand for a permission grant fact.
    pub fn policy(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::Policy(PolicyFact::new(subject, object, action))
    }

    /// Shorthand for a role edge fact.
    pub fn role(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self::Role(RoleFact::new(user, group))
    }

    /// The kind tag of this fact.
    pub fn kind(&self) -> FactKind {
        match self {
            Self::Policy(_) => FactKind::Policy,
            Self::Role(_) => FactKind::Role,
        }
    }

    /// Fields in positional order.
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Self::Policy(p) => vec![p.subject.as_str(), p.object.as_str(), p.action.as_str()],
            Self::Role(r) => vec![r.user.as_str(), r.group.as_str()],
        }
    }

    /// Builds a fact from its kind and positional fields.
    ///
    /// The field count must equal the kind's arity and every field must be a
    /// valid fact value (see [`validate_field`]).
    pub fn from_fields<S: AsRef<str>>(kind: FactKind, fields: &[S]) -> Result<Self> {
        if fields.len() != kind.arity() {
            return Err(Error::invalid_fact(format!(
                "'{kind}' facts take {} fields, got {}",
                kind.arity(),
                fields.len()
            )));
        }
        for (index, field) in fields.iter().enumerate() {
            validate_field(index, field.as_ref())?;
        }

        let f = |i: usize| fields[i].as_ref().to_string();
        Ok(match kind {
            FactKind::Policy => Self::policy(f(0), f(1), f(2)),
            FactKind::Role => Self::role(f(0), f(1)),
        })
    }

    /// Parses a fact line such as `p, group::1, permission::2, read`.
    ///
    /// Whitespace around separators is ignored.
    pub fn parse_line(line: &str) -> Result<Self> {
        let mut tokens = line.split(',').map(str::trim);
        let kind: FactKind = tokens
            .next()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::invalid_fact("empty fact line"))?
            .parse()?;
        let fields: Vec<&str> = tokens.collect();
        Self::from_fields(kind, &fields)
    }

    /// Renders the fact line form.
    pub fn to_line(&self) -> String {
        let mut line = self.kind().as_str().to_string();
        for field in self.fields() {
            line.push_str(LINE_SEPARATOR);
            line.push_str(field);
        }
        line
    }

    /// Checks that the subject-bearing fields are namespaced subjects such as
    /// `group::3`. The action of a grant is free text.
    pub fn validate_subjects(&self) -> Result<()> {
        let subjects = match self {
            Self::Policy(p) => [&p.subject, &p.object],
            Self::Role(r) => [&r.user, &r.group],
        };
        for subject in subjects {
            Subject::parse(subject)?;
        }
        Ok(())
    }

    /// Checks every field of an already-built fact.
    pub fn validate(&self) -> Result<()> {
        for (index, field) in self.fields().into_iter().enumerate() {
            validate_field(index, field)?;
        }
        Ok(())
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

impl FromStr for Fact {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_line(s)
    }
}

impl From<PolicyFact> for Fact {
    fn from(p: PolicyFact) -> Self {
        Self::Policy(p)
    }
}

impl From<RoleFact> for Fact {
    fn from(r: RoleFact) -> Self {
        Self::Role(r)
    }
}

/// A fact value must be non-empty, free of the line separator and of
/// surrounding whitespace, so it survives the line round-trip unchanged.
pub fn validate_field(index: usize, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid_fact(format!("field {index} is empty")));
    }
    if value.contains(',') {
        return Err(Error::invalid_fact(format!(
            "field {index} ('{value}') contains ','"
        )));
    }
    if value.trim() != value {
        return Err(Error::invalid_fact(format!(
            "field {index} ('{value}') has surrounding whitespace"
        )));
    }
    Ok(())
}
