//! Mock ALM server for REST backend tests.
//!
//! Starts an in-process HTTP server implementing the slice of the ALM REST
//! API the importer uses: cookie authentication, the site session, generic
//! entity collections with `{field["value"]}` queries, and folder attachments.

use actix_web::cookie::Cookie;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};

pub const USERNAME: &str = "alice";
pub const PASSWORD: &str = "s3cret";
pub const DOMAIN: &str = "DEFAULT";
pub const PROJECT: &str = "Demo";

const AUTH_COOKIE: &str = "LWSSO_COOKIE_KEY";

/// A stored entity: wire type plus field values.
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub entity_type: String,
    pub fields: BTreeMap<String, String>,
}

impl StoredEntity {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn to_json(&self) -> Value {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|(name, value)| json!({"Name": name, "values": [{"value": value}]}))
            .collect();
        json!({"Type": self.entity_type, "Fields": fields})
    }
}

/// Shared state of the mock server.
#[derive(Debug, Default)]
pub struct MockAlmState {
    next_id: u64,
    /// Collection path (e.g. `tests`, `runs/7/run-steps`) -> entities
    pub collections: HashMap<String, Vec<StoredEntity>>,
    /// (collection/id, slug, size)
    pub attachments: Vec<(String, String, usize)>,
    /// Method and path of every request
    pub requests: Vec<String>,
    /// Answer `DELETE rest/site-session` with a server error
    pub fail_session_close: bool,
}

impl MockAlmState {
    pub fn entities(&self, collection: &str) -> Vec<StoredEntity> {
        self.collections.get(collection).cloned().unwrap_or_default()
    }

    fn insert(
        &mut self,
        collection: &str,
        entity_type: &str,
        mut fields: BTreeMap<String, String>,
    ) -> StoredEntity {
        self.next_id += 1;
        fields.insert("id".to_string(), self.next_id.to_string());
        let entity = StoredEntity {
            entity_type: entity_type.to_string(),
            fields,
        };
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(entity.clone());
        entity
    }
}

type SharedState = Arc<Mutex<MockAlmState>>;

/// Parse `{a["1"];b["x"]}` into field conditions.
fn parse_query(query: &str) -> Vec<(String, String)> {
    let inner = query.trim().trim_start_matches('{').trim_end_matches('}');
    inner
        .split(';')
        .filter_map(|term| {
            let (name, rest) = term.split_once("[\"")?;
            let value = rest.strip_suffix("\"]")?;
            Some((name.to_string(), value.replace("\\\"", "\"")))
        })
        .collect()
}

fn body_fields(body: &[u8]) -> Option<(String, BTreeMap<String, String>)> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let entity_type = value["Type"].as_str()?.to_string();
    let mut fields = BTreeMap::new();
    for field in value["Fields"].as_array()? {
        let name = field["Name"].as_str()?;
        let value = field["values"][0]["value"].as_str().unwrap_or_default();
        fields.insert(name.to_string(), value.to_string());
    }
    Some((entity_type, fields))
}

async fn authenticate(body: String, state: web::Data<SharedState>) -> HttpResponse {
    state
        .lock()
        .unwrap()
        .requests
        .push("POST authentication-point/alm-authenticate".to_string());

    let expected_user = format!("<user>{}</user>", USERNAME);
    let expected_password = format!("<password>{}</password>", PASSWORD);
    if body.contains(&expected_user) && body.contains(&expected_password) {
        HttpResponse::Ok()
            .cookie(Cookie::build(AUTH_COOKIE, "token").path("/").finish())
            .finish()
    } else {
        HttpResponse::Unauthorized().body("Authentication failed")
    }
}

async fn logout(state: web::Data<SharedState>) -> HttpResponse {
    state
        .lock()
        .unwrap()
        .requests
        .push("GET authentication-point/logout".to_string());
    HttpResponse::Ok().finish()
}

async fn site_session(req: HttpRequest, state: web::Data<SharedState>) -> HttpResponse {
    state
        .lock()
        .unwrap()
        .requests
        .push(format!("{} rest/site-session", req.method()));
    if req.cookie(AUTH_COOKIE).is_none() {
        return HttpResponse::Unauthorized().body("Not authenticated");
    }
    let closing = req.method() == actix_web::http::Method::DELETE;
    if closing && state.lock().unwrap().fail_session_close {
        return HttpResponse::InternalServerError().body("Session close failed");
    }
    HttpResponse::Ok().finish()
}

async fn project_resource(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    body: web::Bytes,
    state: web::Data<SharedState>,
) -> HttpResponse {
    let (domain, project, resource) = path.into_inner();
    let method = req.method().as_str().to_string();
    let mut state = state.lock().unwrap();
    state.requests.push(format!("{} {}", method, resource));

    if req.cookie(AUTH_COOKIE).is_none() {
        return HttpResponse::Unauthorized().body("Not authenticated");
    }
    if domain != DOMAIN || project != PROJECT {
        return HttpResponse::NotFound().body("Unknown project");
    }

    let segments: Vec<&str> = resource.split('/').collect();

    // folder attachments
    if segments.len() == 3 && segments[2] == "attachments" && method == "POST" {
        let slug = req
            .headers()
            .get("Slug")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let owner = format!("{}/{}", segments[0], segments[1]);
        state.attachments.push((owner, slug, body.len()));
        return HttpResponse::Created().finish();
    }

    // collections have an odd number of segments: `tests`, `runs/7/run-steps`
    if segments.len() % 2 == 1 {
        let collection = resource.clone();
        return match method.as_str() {
            "GET" => {
                let query = web::Query::<HashMap<String, String>>::from_query(req.query_string())
                    .map(|q| q.into_inner())
                    .unwrap_or_default();
                let conditions = query.get("query").map(|q| parse_query(q)).unwrap_or_default();
                let entities: Vec<Value> = state
                    .entities(&collection)
                    .iter()
                    .filter(|e| {
                        conditions
                            .iter()
                            .all(|(name, value)| e.get(name) == Some(value.as_str()))
                    })
                    .map(StoredEntity::to_json)
                    .collect();
                HttpResponse::Ok().json(json!({
                    "TotalResults": entities.len(),
                    "entities": entities
                }))
            }
            "POST" => match body_fields(&body) {
                Some((entity_type, fields)) => {
                    let created = state.insert(&collection, &entity_type, fields);
                    HttpResponse::Created().json(created.to_json())
                }
                None => HttpResponse::BadRequest().body("Malformed entity"),
            },
            _ => HttpResponse::MethodNotAllowed().finish(),
        };
    }

    // single entity: `<collection>/<id>`
    let Some((collection, id)) = resource.rsplit_once('/') else {
        return HttpResponse::NotFound().finish();
    };
    let Some(entity) = state
        .collections
        .get_mut(collection)
        .and_then(|list| list.iter_mut().find(|e| e.get("id") == Some(id)))
    else {
        return HttpResponse::NotFound().body(format!("No {} with id {}", collection, id));
    };

    match method.as_str() {
        "GET" => HttpResponse::Ok().json(entity.to_json()),
        "PUT" => match body_fields(&body) {
            Some((_, fields)) => {
                entity.fields.extend(fields);
                HttpResponse::Ok().json(entity.to_json())
            }
            None => HttpResponse::BadRequest().body("Malformed entity"),
        },
        _ => HttpResponse::MethodNotAllowed().finish(),
    }
}

/// Mock ALM server bound to an ephemeral port.
pub struct MockAlmServer {
    pub url: String,
    pub state: SharedState,
}

impl MockAlmServer {
    /// Start the server with a seeded bug `42`.
    pub async fn start() -> Self {
        let state: SharedState = Arc::new(Mutex::new(MockAlmState::default()));
        {
            let fields = BTreeMap::from([
                ("id".to_string(), "42".to_string()),
                ("name".to_string(), "Login button missing".to_string()),
                ("status".to_string(), "Open".to_string()),
                ("creation-time".to_string(), "2017-03-01".to_string()),
            ]);
            state.lock().unwrap().collections.insert(
                "defects".to_string(),
                vec![StoredEntity {
                    entity_type: "defect".to_string(),
                    fields,
                }],
            );
        }

        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{}/qcbin", port);

        let state_data = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(state_data.clone()))
                .route(
                    "/qcbin/authentication-point/alm-authenticate",
                    web::post().to(authenticate),
                )
                .route("/qcbin/authentication-point/logout", web::get().to(logout))
                .route("/qcbin/rest/site-session", web::post().to(site_session))
                .route("/qcbin/rest/site-session", web::delete().to(site_session))
                .route(
                    "/qcbin/rest/domains/{domain}/projects/{project}/{resource:.*}",
                    web::to(project_resource),
                )
        })
        .workers(1)
        .listen(listener)
        .expect("failed to listen")
        .disable_signals()
        .run();

        tokio::spawn(server);

        MockAlmServer { url, state }
    }

    pub fn fail_session_close(&self) {
        self.state.lock().unwrap().fail_session_close = true;
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn entities(&self, collection: &str) -> Vec<StoredEntity> {
        self.state.lock().unwrap().entities(collection)
    }

    pub fn attachments(&self) -> Vec<(String, String, usize)> {
        self.state.lock().unwrap().attachments.clone()
    }
}
