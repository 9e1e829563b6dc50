//! Push payload contract and classification.

use std::collections::BTreeSet;

use serde::Deserialize;

/// The all-zero commit hash marking a created or deleted ref endpoint.
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub commits: Vec<CommitPayload>,
    #[serde(default)]
    pub head_commit: Option<CommitPayload>,
    #[serde(default)]
    pub repository: Option<RepositoryPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub author: Option<AuthorPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorPayload {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryPayload {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// A payload that passed field validation.
#[derive(Debug, Clone)]
pub struct ValidPush {
    pub branch: String,
    pub before: String,
    pub after: String,
    pub repo_id: i64,
    pub repo_full_name: String,
    pub commits: Vec<CommitPayload>,
    pub head_commit: Option<CommitPayload>,
}

/// How the push mutates the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// `after` is all zeros: the branch is gone.
    BranchDelete,
    /// `before` is all zeros: first push of the branch.
    BranchCreate,
    /// Empty commit list with both endpoints real: history was rewritten,
    /// the file set comes from `head_commit`.
    ForcePush,
    Update,
}

impl PushPayload {
    /// Check the required fields, returning the missing ones on failure.
    pub fn validate(self) -> Result<ValidPush, Vec<String>> {
        let mut missing = Vec::new();

        let git_ref = self.git_ref.filter(|r| !r.is_empty());
        if git_ref.is_none() {
            missing.push("ref".to_string());
        }
        let after = self.after.filter(|a| !a.is_empty());
        if after.is_none() {
            missing.push("after".to_string());
        }

        let repository = self.repository.unwrap_or_default();
        if repository.id.is_none() {
            missing.push("repository.id".to_string());
        }
        let full_name = repository.full_name.filter(|n| !n.is_empty());
        if full_name.is_none() {
            missing.push("repository.full_name".to_string());
        }

        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(ValidPush {
            branch: branch_from_ref(&git_ref.unwrap()),
            before: self.before.unwrap_or_default(),
            after: after.unwrap(),
            repo_id: repository.id.unwrap(),
            repo_full_name: full_name.unwrap(),
            commits: self.commits,
            head_commit: self.head_commit,
        })
    }
}

impl ValidPush {
    pub fn kind(&self) -> PushKind {
        if self.after == ZERO_SHA {
            PushKind::BranchDelete
        } else if self.before == ZERO_SHA {
            PushKind::BranchCreate
        } else if self.commits.is_empty() {
            PushKind::ForcePush
        } else {
            PushKind::Update
        }
    }

    /// Union of added, modified, and removed paths across the relevant
    /// commits. A force push reads `head_commit` since its commit list is
    /// empty.
    pub fn modified_files(&self) -> Vec<String> {
        let commits: Vec<&CommitPayload> = if self.kind() == PushKind::ForcePush {
            self.head_commit.iter().collect()
        } else {
            self.commits.iter().collect()
        };

        let mut files = BTreeSet::new();
        for commit in commits {
            for path in commit
                .added
                .iter()
                .chain(commit.modified.iter())
                .chain(commit.removed.iter())
            {
                files.insert(path.clone());
            }
        }
        files.into_iter().collect()
    }

    /// Canonical lowercase usernames of the commit authors on this push.
    pub fn author_usernames(&self) -> Vec<String> {
        let mut authors = BTreeSet::new();
        for commit in self.commits.iter().chain(self.head_commit.iter()) {
            if let Some(username) = commit.author.as_ref().and_then(|a| a.username.as_ref()) {
                if !username.is_empty() {
                    authors.insert(username.to_lowercase());
                }
            }
        }
        authors.into_iter().collect()
    }
}

fn branch_from_ref(git_ref: &str) -> String {
    git_ref
        .strip_prefix("refs/heads/")
        .unwrap_or(git_ref)
        .to_string()
}
