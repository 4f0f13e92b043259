//! Push notifications from the source host and the change set derived from them.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Untrusted push payload as delivered by the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub repository: PushRepository,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushCommit {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl PushEvent {
    /// Branch name: the part of `ref` after its last `/`.
    pub fn branch(&self) -> &str {
        match self.git_ref.rfind('/') {
            Some(index) => &self.git_ref[index + 1..],
            None => &self.git_ref,
        }
    }

    pub fn change_set(&self) -> ChangeSet {
        ChangeSet::from_commits(&self.commits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Removed,
    Modified,
    Added,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
            ChangeKind::Added => "added",
        }
    }
}

/// Final classification per file path after replaying every commit in order.
///
/// Later commits overwrite earlier classifications; within one commit the removed,
/// modified and added lists are applied in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: BTreeMap<String, ChangeKind>,
}

impl ChangeSet {
    pub fn from_commits(commits: &[PushCommit]) -> Self {
        let mut entries = BTreeMap::new();
        for commit in commits {
            for path in &commit.removed {
                entries.insert(path.clone(), ChangeKind::Removed);
            }
            for path in &commit.modified {
                entries.insert(path.clone(), ChangeKind::Modified);
            }
            for path in &commit.added {
                entries.insert(path.clone(), ChangeKind::Added);
            }
        }
        Self { entries }
    }

    pub fn get(&self, path: &str) -> Option<ChangeKind> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ChangeKind)> {
        self.entries.iter().map(|(path, kind)| (path.as_str(), *kind))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(added: &[&str], removed: &[&str], modified: &[&str]) -> PushCommit {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        PushCommit {
            added: owned(added),
            removed: owned(removed),
            modified: owned(modified),
        }
    }

    #[test]
    fn later_commit_wins() {
        let commits = vec![commit(&[], &[], &["A"]), commit(&[], &["A"], &[])];
        let changes = ChangeSet::from_commits(&commits);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("A"), Some(ChangeKind::Removed));
    }

    #[test]
    fn re_added_file_is_added() {
        let commits = vec![commit(&[], &["a.css"], &[]), commit(&["a.css"], &[], &[])];
        let changes = ChangeSet::from_commits(&commits);
        assert_eq!(changes.get("a.css"), Some(ChangeKind::Added));
    }

    #[test]
    fn added_overrides_removed_within_one_commit() {
        let commits = vec![commit(&["x.js"], &["x.js"], &[])];
        assert_eq!(
            ChangeSet::from_commits(&commits).get("x.js"),
            Some(ChangeKind::Added)
        );
    }

    #[test]
    fn payload_deserializes_and_exposes_branch() {
        let event: PushEvent = serde_json::from_str(
            r#"{
                "ref": "refs/heads/master",
                "repository": { "full_name": "acme/site" },
                "commits": [
                    { "added": ["www/a.css"], "removed": [], "modified": ["www/index.tera"] }
                ]
            }"#,
        )
        .expect("payload should parse");

        assert_eq!(event.branch(), "master");
        assert_eq!(event.repository.full_name, "acme/site");
        let changes = event.change_set();
        assert_eq!(changes.get("www/a.css"), Some(ChangeKind::Added));
        assert_eq!(changes.get("www/index.tera"), Some(ChangeKind::Modified));
    }

    #[test]
    fn commit_lists_default_when_missing() {
        let event: PushEvent = serde_json::from_str(
            r#"{ "ref": "main", "repository": { "full_name": "a/b" }, "commits": [{}] }"#,
        )
        .expect("payload should parse");
        assert_eq!(event.branch(), "main");
        assert!(event.change_set().is_empty());
    }
}
