//! Backslash separated Quality Center folder paths.

use std::fmt;

use serde::Serialize;

use super::{QcError, QcResult, TreeKind};

/// Absolute folder path inside one of the two folder trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QcPath {
    tree: TreeKind,
    /// Components below the tree root
    components: Vec<String>,
}

impl QcPath {
    /// The root folder of a tree.
    pub fn root(tree: TreeKind) -> Self {
        QcPath {
            tree,
            components: Vec::new(),
        }
    }

    /// Parse `Root\a\b` (Test Lab) or `Subject\a\b` (Test Plan).
    pub fn parse(path: &str) -> QcResult<Self> {
        let normalized = path.replace('/', "\\");
        let mut parts = normalized.split('\\');
        let tree = match parts.next() {
            Some(root) if root == TreeKind::Lab.root_name() => TreeKind::Lab,
            Some(root) if root == TreeKind::Plan.root_name() => TreeKind::Plan,
            _ => return Err(QcError::InvalidPath(path.to_string())),
        };
        Ok(QcPath {
            tree,
            components: normalize(parts),
        })
    }

    /// Test Lab folder of a test: `Root\<destination>\<subject>`.
    pub fn lab(destination: &str, subject: &str) -> Self {
        let destination = strip_root(destination, TreeKind::Lab);
        QcPath {
            tree: TreeKind::Lab,
            components: normalize(split_all(&[destination, subject])),
        }
    }

    /// Test Plan folder of a test: `Subject\<destination>\<subject>\<suite>`.
    pub fn plan(destination: &str, subject: &str, suite: &str) -> Self {
        let destination = strip_root(destination, TreeKind::Lab);
        QcPath {
            tree: TreeKind::Plan,
            components: normalize(split_all(&[destination, subject, suite])),
        }
    }

    pub fn tree(&self) -> TreeKind {
        self.tree
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Last component; the tree root's own name for a root path.
    pub fn name(&self) -> &str {
        self.components
            .last()
            .map(String::as_str)
            .unwrap_or_else(|| self.tree.root_name())
    }

    /// The path truncated to its first `depth` components.
    pub fn ancestor(&self, depth: usize) -> Self {
        QcPath {
            tree: self.tree,
            components: self.components[..depth.min(self.components.len())].to_vec(),
        }
    }

    /// Path of a child folder.
    pub fn join(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        QcPath {
            tree: self.tree,
            components,
        }
    }
}

impl fmt::Display for QcPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tree.root_name())?;
        for component in &self.components {
            write!(f, "\\{}", component)?;
        }
        Ok(())
    }
}

/// Destinations are entered relative to the Test Lab root, with or without it.
fn strip_root(destination: &str, tree: TreeKind) -> &str {
    let trimmed = destination.trim_start_matches(['\\', '/']);
    match trimmed.strip_prefix(tree.root_name()) {
        Some(rest) if rest.is_empty() || rest.starts_with(['\\', '/']) => rest,
        _ => destination,
    }
}

fn split_all<'a>(parts: &[&'a str]) -> Vec<&'a str> {
    parts.iter().flat_map(|p| p.split(['\\', '/'])).collect()
}

/// Drop empty and `.` components, resolve `..`.
fn normalize<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut components: Vec<String> = Vec::new();
    for part in parts {
        match part.trim() {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            other => components.push(other.to_string()),
        }
    }
    components
}
