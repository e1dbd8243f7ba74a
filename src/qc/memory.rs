//! In-process Quality Center backend.
//!
//! Keeps folders, entities and attachments in memory and records every call
//! in an operation log. Clones share the same store, so a caller can keep a
//! handle for inspection after moving the session into the importer.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{
    Entity, EntityKind, EntityRef, Field, Filter, FolderNode, Parent, QcError, QcPath, QcResult,
    QcSession, TreeKind,
};

/// One call made against a [`MemorySession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    InitConnection(String),
    Login(String),
    ConnectProject { domain: String, project: String },
    DisconnectProject,
    Logout,
    ReleaseConnection,
    AddNode(String),
    Create { kind: EntityKind, id: String },
    Update { kind: EntityKind, id: String },
    Refresh { kind: EntityKind, id: String },
    UploadAttachment { folder: String, name: String },
}

/// An uploaded attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub folder: String,
    pub name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct StoredFolder {
    node: FolderNode,
    parent_id: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryStore {
    initialized: bool,
    logged_in: bool,
    connected: bool,
    required_password: Option<String>,
    folders: Vec<StoredFolder>,
    entities: Vec<Entity>,
    attachments: Vec<StoredAttachment>,
    failing_names: Vec<String>,
    ops: Vec<Op>,
    next_id: u64,
}

impl MemoryStore {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    fn require_connection(&self) -> QcResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(QcError::NotConnected)
        }
    }

    fn entity_mut(&mut self, kind: EntityKind, id: &str) -> QcResult<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|e| e.kind == kind && e.id.as_deref() == Some(id))
            .ok_or_else(|| QcError::Remote(format!("{:?} {} does not exist", kind, id)))
    }
}

/// In-memory session with an operation log.
#[derive(Debug, Clone)]
pub struct MemorySession {
    store: Arc<Mutex<MemoryStore>>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// An empty project holding only the two tree roots.
    pub fn new() -> Self {
        let mut store = MemoryStore::default();
        for tree in [TreeKind::Lab, TreeKind::Plan] {
            let id = store.next_id();
            store.folders.push(StoredFolder {
                node: FolderNode {
                    id,
                    name: tree.root_name().to_string(),
                    path: QcPath::root(tree),
                },
                parent_id: None,
            });
        }
        MemorySession {
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Reject logins that do not use this password.
    pub fn with_password(self, password: &str) -> Self {
        self.store().required_password = Some(password.to_string());
        self
    }

    /// Add a bug to the project.
    pub fn with_bug(self, id: u64, summary: &str, status: &str, detection_date: &str) -> Self {
        {
            let mut store = self.store();
            let mut bug = Entity::new(EntityKind::Bug, Parent::Project);
            bug.id = Some(id.to_string());
            bug.set_field(Field::Summary, summary);
            bug.set_field(Field::Status, status);
            bug.set_field(Field::DetectionDate, detection_date);
            store.entities.push(bug);
        }
        self
    }

    /// Make every post of an entity with this name fail.
    pub fn fail_posts_named(self, name: &str) -> Self {
        self.store().failing_names.push(name.to_string());
        self
    }

    /// Posted entities of one kind, in creation order.
    pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        self.store()
            .entities
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Paths of every folder, roots included.
    pub fn folder_paths(&self) -> Vec<String> {
        self.store()
            .folders
            .iter()
            .map(|f| f.node.path.to_string())
            .collect()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.store().ops.clone()
    }

    pub fn attachments(&self) -> Vec<StoredAttachment> {
        self.store().attachments.clone()
    }

    fn store(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_parent(a: &Parent, b: &Parent) -> bool {
    match (a, b) {
        (Parent::Project, Parent::Project) => true,
        (Parent::Folder(a), Parent::Folder(b)) => a.id == b.id,
        (Parent::Entity(a), Parent::Entity(b)) => a == b,
        _ => false,
    }
}

#[async_trait]
impl QcSession for MemorySession {
    async fn init_connection(&mut self, url: &str) -> QcResult<()> {
        let mut store = self.store();
        store.ops.push(Op::InitConnection(url.to_string()));
        store.initialized = true;
        Ok(())
    }

    async fn login(&mut self, username: &str, password: &SecretString) -> QcResult<()> {
        let mut store = self.store();
        store.ops.push(Op::Login(username.to_string()));
        if !store.initialized {
            return Err(QcError::Remote("connection not initialized".to_string()));
        }
        if let Some(required) = &store.required_password
            && required != password.expose_secret()
        {
            return Err(QcError::Remote(format!(
                "Failed to login: invalid credentials for user {}",
                username
            )));
        }
        store.logged_in = true;
        Ok(())
    }

    async fn connect_project(&mut self, domain: &str, project: &str) -> QcResult<()> {
        let mut store = self.store();
        store.ops.push(Op::ConnectProject {
            domain: domain.to_string(),
            project: project.to_string(),
        });
        if !store.logged_in {
            return Err(QcError::Remote("not logged in".to_string()));
        }
        store.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.store().connected
    }

    async fn disconnect_project(&mut self) -> QcResult<()> {
        let mut store = self.store();
        store.ops.push(Op::DisconnectProject);
        store.connected = false;
        Ok(())
    }

    async fn logout(&mut self) -> QcResult<()> {
        let mut store = self.store();
        store.ops.push(Op::Logout);
        store.logged_in = false;
        Ok(())
    }

    async fn release_connection(&mut self) -> QcResult<()> {
        let mut store = self.store();
        store.ops.push(Op::ReleaseConnection);
        store.initialized = false;
        Ok(())
    }

    async fn node_by_path(&mut self, path: &QcPath) -> QcResult<Option<FolderNode>> {
        let store = self.store();
        store.require_connection()?;
        Ok(store
            .folders
            .iter()
            .find(|f| &f.node.path == path)
            .map(|f| f.node.clone()))
    }

    async fn add_node(&mut self, parent: &FolderNode, name: &str) -> QcResult<FolderNode> {
        let mut store = self.store();
        store.require_connection()?;
        let path = parent.path.join(name);
        if store.folders.iter().any(|f| f.node.path == path) {
            return Err(QcError::Remote(format!("folder already exists: {}", path)));
        }

        let node = FolderNode {
            id: store.next_id(),
            name: name.to_string(),
            path,
        };
        debug!("memory: created folder {}", node.path);
        store.ops.push(Op::AddNode(node.path.to_string()));
        store.folders.push(StoredFolder {
            node: node.clone(),
            parent_id: Some(parent.id.clone()),
        });
        Ok(node)
    }

    async fn sub_nodes(&mut self, node: &FolderNode) -> QcResult<Vec<FolderNode>> {
        let store = self.store();
        store.require_connection()?;
        Ok(store
            .folders
            .iter()
            .filter(|f| f.parent_id.as_deref() == Some(node.id.as_str()))
            .map(|f| f.node.clone())
            .collect())
    }

    async fn find(
        &mut self,
        kind: EntityKind,
        parent: &Parent,
        filter: &Filter,
    ) -> QcResult<Vec<Entity>> {
        let store = self.store();
        store.require_connection()?;
        Ok(store
            .entities
            .iter()
            .filter(|e| e.kind == kind && same_parent(&e.parent, parent) && filter.matches(e))
            .cloned()
            .collect())
    }

    async fn post(&mut self, entity: &mut Entity) -> QcResult<()> {
        let mut store = self.store();
        store.require_connection()?;

        let name = entity.field(Field::Name);
        if !name.is_empty() && store.failing_names.iter().any(|n| n == name) {
            return Err(QcError::Remote(format!("Failed to post {}", name)));
        }

        match entity.id.clone() {
            Some(id) => {
                let stored = store.entity_mut(entity.kind, &id)?;
                stored.fields = entity.fields.clone();
                store.ops.push(Op::Update {
                    kind: entity.kind,
                    id,
                });
            }
            None => {
                if entity.kind == EntityKind::TestInstance {
                    let test_id = entity.field(Field::TestId).to_string();
                    // instances are named after their test
                    let test_name = store
                        .entity_mut(EntityKind::Test, &test_id)?
                        .field(Field::Name)
                        .to_string();
                    entity.set_field(Field::Name, test_name);
                }
                let id = store.next_id();
                entity.id = Some(id.clone());
                store.entities.push(entity.clone());
                store.ops.push(Op::Create {
                    kind: entity.kind,
                    id,
                });
            }
        }
        Ok(())
    }

    async fn refresh(&mut self, entity: &mut Entity) -> QcResult<()> {
        let mut store = self.store();
        store.require_connection()?;
        let EntityRef { kind, id } = entity
            .reference()
            .ok_or_else(|| QcError::Remote("cannot refresh an unposted entity".to_string()))?;

        entity.fields = store.entity_mut(kind, &id)?.fields.clone();
        store.ops.push(Op::Refresh { kind, id });
        Ok(())
    }

    async fn upload_attachment(
        &mut self,
        folder: &FolderNode,
        file: &Path,
        name: &str,
    ) -> QcResult<()> {
        let content = std::fs::read(file)
            .map_err(|e| QcError::Archive(format!("cannot read {}: {}", file.display(), e)))?;

        let mut store = self.store();
        store.require_connection()?;
        store.ops.push(Op::UploadAttachment {
            folder: folder.path.to_string(),
            name: name.to_string(),
        });
        store.attachments.push(StoredAttachment {
            folder: folder.path.to_string(),
            name: name.to_string(),
            content,
        });
        Ok(())
    }
}
