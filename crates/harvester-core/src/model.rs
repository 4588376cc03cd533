use serde::Deserialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A repository as listed by the remote API, plus its local checkout once cloned.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub clone_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub fork: bool,
    #[serde(skip)]
    pub local_path: Option<PathBuf>,
}

impl RepositoryRecord {
    pub fn new(name: impl Into<String>, clone_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clone_url: clone_url.into(),
            size: 0,
            fork: false,
            local_path: None,
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Author,
    Committer,
    Both,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Author => "Author",
            Role::Committer => "Committer",
            Role::Both => "Author+Committer",
        }
    }
}

impl BitOr for Role {
    type Output = Role;

    fn bitor(self, rhs: Role) -> Role {
        if self == rhs { self } else { Role::Both }
    }
}

impl BitOrAssign for Role {
    fn bitor_assign(&mut self, rhs: Role) {
        *self = *self | rhs;
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One identity line seen in one shortlog query of one repository.
#[derive(Clone, Debug)]
pub struct EmailAssociation {
    pub repo: Arc<RepositoryRecord>,
    pub email: String,
    pub role: Role,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct GroupKey {
    pub email: String,
    pub repo: Arc<RepositoryRecord>,
}
