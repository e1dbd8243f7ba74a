//! ALM / Quality Center REST backend.
//!
//! Authentication uses the `authentication-point` endpoints and a site
//! session; the session lives in cookies kept by the HTTP client. Entities
//! are exchanged in the ALM JSON format:
//! `{"Type": "test", "Fields": [{"Name": "name", "values": [{"value": "T1"}]}]}`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    Entity, EntityKind, Field, Filter, FolderNode, Parent, QcError, QcPath, QcResult, QcSession,
    TreeKind,
};

/// Id of the Test Lab root folder.
const LAB_ROOT_ID: &str = "0";
/// Id of the Test Plan root folder.
const PLAN_ROOT_ID: &str = "2";

const RUN_SUBTYPE: &str = "hp.qc.run.MANUAL";
const TEST_SET_SUBTYPE: &str = "hp.qc.test-set.default";
const TEST_INSTANCE_SUBTYPE: &str = "hp.qc.test-instance.MANUAL";

const FIELDS: [Field; 15] = [
    Field::Id,
    Field::Name,
    Field::Description,
    Field::Status,
    Field::Type,
    Field::Duration,
    Field::ExecutionDate,
    Field::ExecutionTime,
    Field::Expected,
    Field::Actual,
    Field::TestId,
    Field::BugId,
    Field::LinkType,
    Field::Summary,
    Field::DetectionDate,
];

#[derive(Debug, Serialize, Deserialize)]
struct WireEntity {
    #[serde(rename = "Type")]
    entity_type: String,
    #[serde(rename = "Fields")]
    fields: Vec<WireField>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireField {
    #[serde(rename = "Name")]
    name: String,
    #[serde(default)]
    values: Vec<WireValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireValue {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireList {
    #[serde(default)]
    entities: Vec<WireEntity>,
}

impl WireEntity {
    fn new(entity_type: &str) -> Self {
        WireEntity {
            entity_type: entity_type.to_string(),
            fields: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push(WireField {
            name: name.to_string(),
            values: vec![WireValue {
                value: Some(value.into()),
            }],
        });
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.values.first())
            .and_then(|v| v.value.as_deref())
    }
}

/// Wire type of an entity kind.
fn entity_type(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Test => "test",
        EntityKind::TestSet => "test-set",
        EntityKind::TestInstance => "test-instance",
        EntityKind::Run => "run",
        EntityKind::RunStep => "run-step",
        EntityKind::Bug => "defect",
        EntityKind::BugLink => "defect-link",
    }
}

/// Collection of an entity kind below the project URL.
fn collection(kind: EntityKind, parent: &Parent) -> QcResult<String> {
    Ok(match kind {
        EntityKind::Test => "tests".to_string(),
        EntityKind::TestSet => "test-sets".to_string(),
        EntityKind::TestInstance => "test-instances".to_string(),
        EntityKind::Run => "runs".to_string(),
        EntityKind::RunStep => match parent {
            Parent::Entity(run) if run.kind == EntityKind::Run => {
                format!("runs/{}/run-steps", run.id)
            }
            _ => return Err(QcError::InvalidInput("run step without run".to_string())),
        },
        EntityKind::Bug => "defects".to_string(),
        EntityKind::BugLink => "defect-links".to_string(),
    })
}

fn folder_collection(tree: TreeKind) -> &'static str {
    match tree {
        TreeKind::Lab => "test-set-folders",
        TreeKind::Plan => "test-folders",
    }
}

fn folder_type(tree: TreeKind) -> &'static str {
    match tree {
        TreeKind::Lab => "test-set-folder",
        TreeKind::Plan => "test-folder",
    }
}

fn root_id(tree: TreeKind) -> &'static str {
    match tree {
        TreeKind::Lab => LAB_ROOT_ID,
        TreeKind::Plan => PLAN_ROOT_ID,
    }
}

/// Wire name of a field.
fn field_name(kind: EntityKind, field: Field) -> &'static str {
    match field {
        Field::Id => "id",
        Field::Name | Field::Summary => "name",
        Field::Description => "description",
        Field::Status => "status",
        Field::Type => "subtype-id",
        Field::Duration => "duration",
        Field::ExecutionDate => "execution-date",
        Field::ExecutionTime => "execution-time",
        Field::Expected => "expected",
        Field::Actual => "actual",
        Field::TestId => "test-id",
        Field::BugId => "first-endpoint-id",
        Field::LinkType => "link-type",
        Field::DetectionDate if kind == EntityKind::Bug => "creation-time",
        Field::DetectionDate => "creation-date",
    }
}

/// Fields that tie an entity to its parent.
fn parent_fields(kind: EntityKind, parent: &Parent) -> Vec<(&'static str, String)> {
    match (kind, parent) {
        (_, Parent::Folder(folder)) => vec![("parent-id", folder.id.clone())],
        (EntityKind::TestInstance, Parent::Entity(set)) => vec![("cycle-id", set.id.clone())],
        (EntityKind::Run, Parent::Entity(instance)) => vec![("testcycl-id", instance.id.clone())],
        (EntityKind::BugLink, Parent::Entity(owner)) => vec![
            ("second-endpoint-id", owner.id.clone()),
            ("second-endpoint-type", entity_type(owner.kind).to_string()),
        ],
        _ => Vec::new(),
    }
}

/// ALM query expression: `{name["T1"];parent-id["12"]}`.
fn query_expression(conditions: &[(&str, String)]) -> String {
    let terms: Vec<String> = conditions
        .iter()
        .map(|(name, value)| format!("{}[\"{}\"]", name, value.replace('"', "\\\"")))
        .collect();
    format!("{{{}}}", terms.join(";"))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Fail on non-success statuses, keeping the server message.
async fn check(response: Response) -> QcResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(QcError::Remote(format!("HTTP {}: {}", status, body.trim())))
}

/// Session against an ALM server.
pub struct AlmRestSession {
    client: Client,
    base_url: Option<String>,
    project_url: Option<String>,
    username: String,
    connected: bool,
}

impl AlmRestSession {
    pub fn new(timeout: Duration) -> QcResult<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(AlmRestSession {
            client,
            base_url: None,
            project_url: None,
            username: String::new(),
            connected: false,
        })
    }

    fn base_url(&self) -> QcResult<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| QcError::Remote("connection not initialized".to_string()))
    }

    fn project_url(&self) -> QcResult<&str> {
        match (&self.project_url, self.connected) {
            (Some(url), true) => Ok(url),
            _ => Err(QcError::NotConnected),
        }
    }

    async fn get_entity(&self, path: &str) -> QcResult<WireEntity> {
        let url = format!("{}/{}", self.project_url()?, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn query(&self, path: &str, conditions: &[(&str, String)]) -> QcResult<Vec<WireEntity>> {
        let mut url = format!("{}/{}?page-size=max", self.project_url()?, path);
        if !conditions.is_empty() {
            url.push_str("&query=");
            url.push_str(&urlencoding::encode(&query_expression(conditions)));
        }
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;
        let list: WireList = check(response).await?.json().await?;
        Ok(list.entities)
    }

    async fn send_entity(&self, create: bool, path: &str, body: &WireEntity) -> QcResult<WireEntity> {
        let url = format!("{}/{}", self.project_url()?, path);
        debug!("{} {}", if create { "POST" } else { "PUT" }, url);
        let request = if create {
            self.client.post(&url)
        } else {
            self.client.put(&url)
        };
        let response = request
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    fn to_entity(&self, kind: EntityKind, parent: &Parent, wire: &WireEntity) -> Entity {
        let mut entity = Entity::new(kind, parent.clone());
        entity.id = wire.get("id").map(str::to_string);
        for field in FIELDS.into_iter().filter(|f| *f != Field::Id) {
            if let Some(value) = wire.get(field_name(kind, field)) {
                entity.set_field(field, value);
            }
        }
        entity
    }

    fn folder_node(&self, parent: &QcPath, wire: &WireEntity) -> QcResult<FolderNode> {
        let id = wire
            .get("id")
            .ok_or_else(|| QcError::Remote("folder without id".to_string()))?;
        let name = wire.get("name").unwrap_or_default();
        Ok(FolderNode {
            id: id.to_string(),
            name: name.to_string(),
            path: parent.join(name),
        })
    }

    /// Body of a create or update request.
    async fn wire_body(&self, entity: &Entity) -> QcResult<WireEntity> {
        let mut wire = WireEntity::new(entity_type(entity.kind));
        for (field, value) in &entity.fields {
            wire.push(field_name(entity.kind, *field), value.as_str());
        }

        if entity.id.is_none() {
            for (name, value) in parent_fields(entity.kind, &entity.parent) {
                wire.push(name, value);
            }
            match entity.kind {
                EntityKind::TestSet => wire.push("subtype-id", TEST_SET_SUBTYPE),
                EntityKind::TestInstance => wire.push("subtype-id", TEST_INSTANCE_SUBTYPE),
                EntityKind::Run => {
                    // a run also names the test and the test set of its instance
                    if let Parent::Entity(instance) = &entity.parent {
                        let instance = self
                            .get_entity(&format!("test-instances/{}", instance.id))
                            .await?;
                        for name in ["test-id", "cycle-id"] {
                            if let Some(value) = instance.get(name) {
                                wire.push(name, value);
                            }
                        }
                    }
                    wire.push("subtype-id", RUN_SUBTYPE);
                    wire.push("owner", self.username.as_str());
                }
                _ => {}
            }
        }
        Ok(wire)
    }
}

#[async_trait]
impl QcSession for AlmRestSession {
    async fn init_connection(&mut self, url: &str) -> QcResult<()> {
        self.base_url = Some(url.trim_end_matches('/').to_string());
        Ok(())
    }

    async fn login(&mut self, username: &str, password: &SecretString) -> QcResult<()> {
        let url = format!("{}/authentication-point/alm-authenticate", self.base_url()?);
        let body = format!(
            "<alm-authentication><user>{}</user><password>{}</password></alm-authentication>",
            xml_escape(username),
            xml_escape(password.expose_secret())
        );
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;
        check(response).await?;
        self.username = username.to_string();
        Ok(())
    }

    async fn connect_project(&mut self, domain: &str, project: &str) -> QcResult<()> {
        let base = self.base_url()?.to_string();
        let response = self
            .client
            .post(format!("{}/rest/site-session", base))
            .send()
            .await?;
        check(response).await?;

        self.project_url = Some(format!(
            "{}/rest/domains/{}/projects/{}",
            base,
            urlencoding::encode(domain),
            urlencoding::encode(project)
        ));
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn disconnect_project(&mut self) -> QcResult<()> {
        let url = format!("{}/rest/site-session", self.base_url()?);
        self.connected = false;
        self.project_url = None;
        check(self.client.delete(&url).send().await?).await?;
        Ok(())
    }

    async fn logout(&mut self) -> QcResult<()> {
        let url = format!("{}/authentication-point/logout", self.base_url()?);
        check(self.client.get(&url).send().await?).await?;
        Ok(())
    }

    async fn release_connection(&mut self) -> QcResult<()> {
        self.base_url = None;
        self.username.clear();
        Ok(())
    }

    async fn node_by_path(&mut self, path: &QcPath) -> QcResult<Option<FolderNode>> {
        let tree = path.tree();
        let mut node = FolderNode {
            id: root_id(tree).to_string(),
            name: tree.root_name().to_string(),
            path: QcPath::root(tree),
        };
        for name in path.components() {
            let conditions = [("parent-id", node.id.clone()), ("name", name.clone())];
            let found = self.query(folder_collection(tree), &conditions).await?;
            let Some(wire) = found.first() else {
                return Ok(None);
            };
            node = self.folder_node(&node.path, wire)?;
        }
        Ok(Some(node))
    }

    async fn add_node(&mut self, parent: &FolderNode, name: &str) -> QcResult<FolderNode> {
        let tree = parent.tree();
        let mut wire = WireEntity::new(folder_type(tree));
        wire.push("parent-id", parent.id.as_str());
        wire.push("name", name);
        let created = self
            .send_entity(true, folder_collection(tree), &wire)
            .await?;
        self.folder_node(&parent.path, &created)
    }

    async fn sub_nodes(&mut self, node: &FolderNode) -> QcResult<Vec<FolderNode>> {
        let tree = node.tree();
        let found = self
            .query(folder_collection(tree), &[("parent-id", node.id.clone())])
            .await?;
        found
            .iter()
            .map(|wire| self.folder_node(&node.path, wire))
            .collect()
    }

    async fn find(
        &mut self,
        kind: EntityKind,
        parent: &Parent,
        filter: &Filter,
    ) -> QcResult<Vec<Entity>> {
        let path = collection(kind, parent)?;
        let mut conditions = if kind == EntityKind::RunStep {
            Vec::new()
        } else {
            parent_fields(kind, parent)
        };
        for (field, value) in &filter.conditions {
            conditions.push((field_name(kind, *field), value.clone()));
        }

        let found = self.query(&path, &conditions).await?;
        Ok(found
            .iter()
            .map(|wire| self.to_entity(kind, parent, wire))
            .collect())
    }

    async fn post(&mut self, entity: &mut Entity) -> QcResult<()> {
        let path = collection(entity.kind, &entity.parent)?;
        let body = self.wire_body(entity).await?;
        let saved = match &entity.id {
            Some(id) => {
                self.send_entity(false, &format!("{}/{}", path, id), &body)
                    .await?
            }
            None => self.send_entity(true, &path, &body).await?,
        };
        let id = saved
            .get("id")
            .ok_or_else(|| QcError::Remote(format!("{} saved without id", body.entity_type)))?;
        entity.id = Some(id.to_string());
        Ok(())
    }

    async fn refresh(&mut self, entity: &mut Entity) -> QcResult<()> {
        let id = entity
            .id
            .clone()
            .ok_or_else(|| QcError::Remote("cannot refresh an unposted entity".to_string()))?;
        let path = collection(entity.kind, &entity.parent)?;
        let wire = self.get_entity(&format!("{}/{}", path, id)).await?;
        let fresh = self.to_entity(entity.kind, &entity.parent, &wire);
        entity.fields = fresh.fields;
        Ok(())
    }

    async fn upload_attachment(
        &mut self,
        folder: &FolderNode,
        file: &Path,
        name: &str,
    ) -> QcResult<()> {
        let content = tokio::fs::read(file)
            .await
            .map_err(|e| QcError::Archive(format!("cannot read {}: {}", file.display(), e)))?;
        let url = format!(
            "{}/{}/{}/attachments",
            self.project_url()?,
            folder_collection(folder.tree()),
            folder.id
        );
        debug!("POST {} ({} bytes)", url, content.len());
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/octet-stream")
            .header("Slug", name)
            .body(content)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}
