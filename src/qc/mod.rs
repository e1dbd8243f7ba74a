//! Quality Center boundary.
//!
//! [`QcSession`] is the remote object model the importer needs: a
//! connection lifecycle, two folder trees and a handful of entity
//! factories. Entities are built locally, then posted; posting an entity
//! without an id creates it, posting one with an id updates all its fields.
//!
//! Backends:
//! - [`AlmRestSession`]: the ALM REST API
//! - [`MemorySession`]: an in-process store, used for dry runs and tests
//!
//! The operations built on top of a session live in [`adapter`].

pub mod adapter;
mod memory;
mod path;
mod rest;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;

pub use memory::{MemorySession, Op, StoredAttachment};
pub use path::QcPath;
pub use rest::AlmRestSession;

/// Errors raised at the remote boundary. Remote messages are kept verbatim.
#[derive(Debug, thiserror::Error)]
pub enum QcError {
    #[error("{0}")]
    Remote(String),

    #[error("not connected to Quality Center")]
    NotConnected,

    #[error("invalid folder path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("cannot build attachment: {0}")]
    Archive(String),
}

impl From<reqwest::Error> for QcError {
    fn from(err: reqwest::Error) -> Self {
        QcError::Remote(err.to_string())
    }
}

impl From<zip::result::ZipError> for QcError {
    fn from(err: zip::result::ZipError) -> Self {
        QcError::Archive(err.to_string())
    }
}

pub type QcResult<T> = Result<T, QcError>;

/// The two folder trees of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TreeKind {
    /// Test Lab: test sets, instances and runs
    Lab,
    /// Test Plan: test definitions
    Plan,
}

impl TreeKind {
    /// Name of the root folder.
    pub fn root_name(&self) -> &'static str {
        match self {
            Self::Lab => "Root",
            Self::Plan => "Subject",
        }
    }
}

/// A folder in one of the trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderNode {
    pub id: String,
    pub name: String,
    pub path: QcPath,
}

impl FolderNode {
    pub fn tree(&self) -> TreeKind {
        self.path.tree()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EntityKind {
    /// Test Plan test
    Test,
    TestSet,
    /// A test placed in a test set
    TestInstance,
    Run,
    RunStep,
    Bug,
    BugLink,
}

/// Entity fields the importer reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Field {
    /// Matched against [`Entity::id`]
    Id,
    Name,
    Description,
    Status,
    Type,
    Duration,
    ExecutionDate,
    ExecutionTime,
    Expected,
    Actual,
    /// Test Plan test of a test instance
    TestId,
    /// Bug of a bug link
    BugId,
    LinkType,
    Summary,
    DetectionDate,
}

/// Reference to a posted entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

/// Owner of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Parent {
    /// Project level (bugs)
    Project,
    Folder(FolderNode),
    Entity(EntityRef),
}

/// A remote entity. `id` is `None` until the entity is posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub id: Option<String>,
    pub parent: Parent,
    pub fields: BTreeMap<Field, String>,
}

impl Entity {
    /// A new local item; nothing is sent until it is posted.
    pub fn new(kind: EntityKind, parent: Parent) -> Self {
        Entity {
            kind,
            id: None,
            parent,
            fields: BTreeMap::new(),
        }
    }

    pub fn set_field(&mut self, field: Field, value: impl Into<String>) {
        self.fields.insert(field, value.into());
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Id => self.id.as_deref().unwrap_or_default(),
            _ => self.fields.get(&field).map(String::as_str).unwrap_or_default(),
        }
    }

    pub fn reference(&self) -> Option<EntityRef> {
        self.id.as_ref().map(|id| EntityRef {
            kind: self.kind,
            id: id.clone(),
        })
    }
}

/// Exact-match field filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub conditions: Vec<(Field, String)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.conditions.push((field, value.into()));
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.conditions
            .iter()
            .all(|(field, value)| entity.field(*field) == value)
    }
}

/// Login parameters.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub url: String,
    pub domain: String,
    pub project: String,
    pub username: String,
    pub password: SecretString,
}

/// Bug summary as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BugInfo {
    pub id: String,
    pub summary: String,
    pub status: String,
    pub detection_date: String,
}

/// The remote object model.
#[async_trait]
pub trait QcSession: Send {
    async fn init_connection(&mut self, url: &str) -> QcResult<()>;
    async fn login(&mut self, username: &str, password: &SecretString) -> QcResult<()>;
    async fn connect_project(&mut self, domain: &str, project: &str) -> QcResult<()>;
    fn is_connected(&self) -> bool;
    async fn disconnect_project(&mut self) -> QcResult<()>;
    async fn logout(&mut self) -> QcResult<()>;
    async fn release_connection(&mut self) -> QcResult<()>;

    /// Look up a folder; `None` when it does not exist.
    async fn node_by_path(&mut self, path: &QcPath) -> QcResult<Option<FolderNode>>;
    async fn add_node(&mut self, parent: &FolderNode, name: &str) -> QcResult<FolderNode>;
    async fn sub_nodes(&mut self, node: &FolderNode) -> QcResult<Vec<FolderNode>>;

    async fn find(
        &mut self,
        kind: EntityKind,
        parent: &Parent,
        filter: &Filter,
    ) -> QcResult<Vec<Entity>>;
    /// Create the entity when it has no id, otherwise update its fields.
    async fn post(&mut self, entity: &mut Entity) -> QcResult<()>;
    /// Reload the fields of a posted entity.
    async fn refresh(&mut self, entity: &mut Entity) -> QcResult<()>;

    /// Upload a local file as an attachment of a folder.
    async fn upload_attachment(
        &mut self,
        folder: &FolderNode,
        file: &Path,
        name: &str,
    ) -> QcResult<()>;
}
