//! Importer operations on top of a [`QcSession`].
//!
//! Every operation is a sequence of blocking round trips; none is retried.
//! Remote faults are returned to the caller unmodified.

use std::path::Path;

use chrono::Local;
use tracing::{debug, error, info, warn};

use super::{
    BugInfo, Credentials, Entity, EntityKind, Field, Filter, FolderNode, Parent, QcError, QcPath,
    QcResult, QcSession,
};
use crate::models::{StepRecord, TestRecord};
use crate::services::archive::build_report_archive;

/// Status of a newly created test plan.
const NEW_TEST_STATUS: &str = "Ready";
/// Type tag of a newly created test plan.
const NEW_TEST_TYPE: &str = "QUICKTEST_TEST";
const BUG_LINK_TYPE: &str = "Related";

/// Initialize, log in and open the project, in that order.
pub async fn connect<S>(session: &mut S, credentials: &Credentials) -> QcResult<()>
where
    S: QcSession + ?Sized,
{
    info!("Connecting to Quality Center...");
    session.init_connection(&credentials.url).await?;
    session
        .login(&credentials.username, &credentials.password)
        .await?;
    session
        .connect_project(&credentials.domain, &credentials.project)
        .await?;
    info!(
        "Connected to Quality Center: {} / {}",
        credentials.domain, credentials.project
    );
    Ok(())
}

/// Disconnect, log out and release. A missing or closed session is left alone.
///
/// Every step is attempted even when an earlier one fails; the first error
/// is returned.
pub async fn disconnect<S>(session: Option<&mut S>) -> QcResult<()>
where
    S: QcSession + ?Sized,
{
    let Some(session) = session else {
        return Ok(());
    };
    if !session.is_connected() {
        info!("Already disconnected from Quality Center.");
        return Ok(());
    }

    let steps = [
        ("disconnect", session.disconnect_project().await),
        ("logout", session.logout().await),
        ("release", session.release_connection().await),
    ];
    let mut first_error = None;
    for (step, result) in steps {
        if let Err(e) = result {
            error!("Quality Center {} failed: {}", step, e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => {
            info!("Disconnected from Quality Center.");
            Ok(())
        }
    }
}

/// Resolve a folder, optionally creating every missing folder along the path.
///
/// Returns `None` when the folder does not exist and `create` is false.
pub async fn get_qc_folder<S>(
    session: &mut S,
    path: &QcPath,
    create: bool,
) -> QcResult<Option<FolderNode>>
where
    S: QcSession + ?Sized,
{
    if let Some(node) = session.node_by_path(path).await? {
        return Ok(Some(node));
    }
    // tree roots are never created
    if !create || path.is_root() {
        return Ok(None);
    }

    debug!("Folder {} not found, creating folder structure...", path);
    let root = path.ancestor(0);
    let mut parent = session
        .node_by_path(&root)
        .await?
        .ok_or_else(|| QcError::FolderNotFound(root.to_string()))?;

    for depth in 1..=path.components().len() {
        let current = path.ancestor(depth);
        parent = match session.node_by_path(&current).await? {
            Some(node) => node,
            None => {
                debug!("Creating folder: {}", current);
                session.add_node(&parent, current.name()).await.map_err(|e| {
                    error!("Error creating folder {}: {}", current, e);
                    e
                })?
            }
        };
    }
    Ok(Some(parent))
}

/// Direct child folders of `path`.
pub async fn get_subdirectories<S>(session: &mut S, path: &QcPath) -> QcResult<Vec<FolderNode>>
where
    S: QcSession + ?Sized,
{
    let node = get_qc_folder(session, path, false)
        .await?
        .ok_or_else(|| QcError::FolderNotFound(path.to_string()))?;
    session.sub_nodes(&node).await
}

async fn require_folder<S>(session: &mut S, path: &QcPath) -> QcResult<FolderNode>
where
    S: QcSession + ?Sized,
{
    get_qc_folder(session, path, true)
        .await?
        .ok_or_else(|| QcError::FolderNotFound(path.to_string()))
}

/// Find the Test Plan test of `test` by name, creating it when missing.
pub async fn make_test_plan<S>(
    session: &mut S,
    destination: &str,
    test: &TestRecord,
) -> QcResult<Entity>
where
    S: QcSession + ?Sized,
{
    let path = QcPath::plan(destination, &test.subject, &test.suite);
    let folder = Parent::Folder(require_folder(session, &path).await?);

    let filter = Filter::new().with(Field::Name, &test.name);
    if let Some(existing) = session
        .find(EntityKind::Test, &folder, &filter)
        .await?
        .into_iter()
        .next()
    {
        return Ok(existing);
    }

    let mut plan = Entity::new(EntityKind::Test, folder);
    plan.set_field(Field::Name, &test.name);
    plan.set_field(Field::Description, &test.description);
    plan.set_field(Field::Status, NEW_TEST_STATUS);
    plan.set_field(Field::Type, NEW_TEST_TYPE);
    session.post(&mut plan).await?;
    debug!("Created test plan {} in {}", test.name, path);
    Ok(plan)
}

/// Find the instance of `plan` in the test set named after the suite,
/// creating the test set and the instance when missing.
pub async fn make_test_instance<S>(
    session: &mut S,
    destination: &str,
    plan: &Entity,
    test: &TestRecord,
) -> QcResult<Entity>
where
    S: QcSession + ?Sized,
{
    if test.suite.trim().is_empty() {
        error!("suite cannot be empty: {}", test.name);
        return Err(QcError::InvalidInput(format!(
            "suite cannot be empty for test '{}'",
            test.name
        )));
    }
    let plan_id = plan
        .id
        .clone()
        .ok_or_else(|| QcError::InvalidInput(format!("test plan '{}' is not posted", test.name)))?;

    let path = QcPath::lab(destination, &test.subject);
    let folder = Parent::Folder(require_folder(session, &path).await?);

    let set_filter = Filter::new().with(Field::Name, &test.suite);
    let test_set = match session
        .find(EntityKind::TestSet, &folder, &set_filter)
        .await?
        .into_iter()
        .next()
    {
        Some(existing) => existing,
        None => {
            let mut test_set = Entity::new(EntityKind::TestSet, folder);
            test_set.set_field(Field::Name, &test.suite);
            session.post(&mut test_set).await?;
            session.refresh(&mut test_set).await?;
            test_set
        }
    };
    let set_ref = test_set
        .reference()
        .ok_or_else(|| QcError::Remote(format!("test set '{}' has no id", test.suite)))?;
    let owner = Parent::Entity(set_ref);

    let instance_filter = Filter::new().with(Field::TestId, &plan_id);
    let mut instances = session
        .find(EntityKind::TestInstance, &owner, &instance_filter)
        .await?;
    if instances.is_empty() {
        let mut instance = Entity::new(EntityKind::TestInstance, owner.clone());
        instance.set_field(Field::TestId, &plan_id);
        session.post(&mut instance).await?;
        instances = session
            .find(EntityKind::TestInstance, &owner, &instance_filter)
            .await?;
    }

    instances.into_iter().next().ok_or_else(|| {
        QcError::Remote(format!("test instance of '{}' was not created", test.name))
    })
}

/// Create a new run of `instance`.
///
/// The execution date and time only show up reliably after being set,
/// posted and refreshed twice.
pub async fn make_test_run<S>(
    session: &mut S,
    instance: &Entity,
    test: &TestRecord,
) -> QcResult<Entity>
where
    S: QcSession + ?Sized,
{
    let owner = instance
        .reference()
        .ok_or_else(|| QcError::InvalidInput("test instance is not posted".to_string()))?;

    let mut run = Entity::new(EntityKind::Run, Parent::Entity(owner));
    run.set_field(
        Field::Name,
        format!("Run {}", Local::now().format("%Y-%m-%d %H:%M:%S%.6f")),
    );
    run.set_field(Field::Status, test.status.as_str());
    run.set_field(Field::Duration, test.duration.unwrap_or(0).to_string());
    run.set_field(Field::ExecutionDate, &test.exec_date);
    run.set_field(Field::ExecutionTime, &test.exec_time);
    session.post(&mut run).await?;
    session.refresh(&mut run).await?;

    run.set_field(Field::ExecutionDate, &test.exec_date);
    run.set_field(Field::ExecutionTime, &test.exec_time);
    session.post(&mut run).await?;
    session.refresh(&mut run).await?;
    Ok(run)
}

/// Create one run step per record. Each step is posted, refreshed and posted again.
pub async fn upload_steps<S>(session: &mut S, run: &Entity, steps: &[StepRecord]) -> QcResult<()>
where
    S: QcSession + ?Sized,
{
    let owner = run
        .reference()
        .ok_or_else(|| QcError::InvalidInput("run is not posted".to_string()))?;

    for step in steps {
        let mut run_step = Entity::new(EntityKind::RunStep, Parent::Entity(owner.clone()));
        run_step.set_field(Field::Name, &step.name);
        run_step.set_field(Field::Status, step.status.as_str());
        run_step.set_field(Field::Description, &step.description);
        run_step.set_field(Field::Expected, &step.expected);
        run_step.set_field(Field::Actual, &step.actual);
        run_step.set_field(Field::ExecutionDate, &step.exec_date);
        run_step.set_field(Field::ExecutionTime, &step.exec_time);
        session.post(&mut run_step).await?;
        session.refresh(&mut run_step).await?;
        session.post(&mut run_step).await?;
    }
    Ok(())
}

/// Upload one test as a run: plan, instance, run, steps, then the bug link.
pub async fn import_test_result<S>(
    session: &mut S,
    destination: &str,
    test: &TestRecord,
) -> QcResult<()>
where
    S: QcSession + ?Sized,
{
    let plan = make_test_plan(session, destination, test).await?;
    let instance = make_test_instance(session, destination, &plan, test).await?;
    let run = make_test_run(session, &instance, test).await?;
    upload_steps(session, &run, &test.steps).await?;

    if let Some(bug_id) = test.bug_id() {
        info!("Linking bug: {}", bug_id);
        link_bug(session, &instance, bug_id).await?;
    }
    Ok(())
}

/// Link an existing bug to a test instance. Returns false when the bug does not exist.
pub async fn link_bug<S>(session: &mut S, instance: &Entity, bug_id: u64) -> QcResult<bool>
where
    S: QcSession + ?Sized,
{
    let filter = Filter::new().with(Field::Id, bug_id.to_string());
    let bugs = session
        .find(EntityKind::Bug, &Parent::Project, &filter)
        .await?;
    let Some(bug) = bugs.into_iter().next() else {
        error!("No bug found with id {}", bug_id);
        return Ok(false);
    };

    let owner = instance
        .reference()
        .ok_or_else(|| QcError::InvalidInput("test instance is not posted".to_string()))?;
    let mut link = Entity::new(EntityKind::BugLink, Parent::Entity(owner));
    link.set_field(Field::BugId, bug.field(Field::Id));
    link.set_field(Field::LinkType, BUG_LINK_TYPE);
    session.post(&mut link).await?;
    Ok(true)
}

/// Every bug of the project. Unfiltered: the cost grows with the bug count.
pub async fn get_bugs<S>(session: &mut S) -> QcResult<Vec<BugInfo>>
where
    S: QcSession + ?Sized,
{
    let bugs = session
        .find(EntityKind::Bug, &Parent::Project, &Filter::new())
        .await?;
    Ok(bugs
        .iter()
        .map(|bug| BugInfo {
            id: bug.field(Field::Id).to_string(),
            summary: bug.field(Field::Summary).to_string(),
            status: bug.field(Field::Status).to_string(),
            detection_date: bug.field(Field::DetectionDate).to_string(),
        })
        .collect())
}

/// Zip the report artifacts of `report_dir` and attach the archive to the
/// Test Lab folder `Root\<destination>`. The local archive is always removed.
pub async fn attach_report<S>(
    session: &mut S,
    report_dir: &Path,
    globs: &[String],
    destination: &str,
    archive_name: &str,
) -> QcResult<()>
where
    S: QcSession + ?Sized,
{
    let path = QcPath::lab(destination, "");
    let folder = require_folder(session, &path).await?;

    let archive_path = std::env::temp_dir().join(archive_name);
    let result = async {
        let entries = build_report_archive(report_dir, globs, &archive_path)?;
        info!(
            "Attaching {} ({} entries) to {}",
            archive_name,
            entries.len(),
            path
        );
        session
            .upload_attachment(&folder, &archive_path, archive_name)
            .await
    }
    .await;

    if let Err(e) = std::fs::remove_file(&archive_path) {
        warn!(
            "Could not remove local archive {}: {}",
            archive_path.display(),
            e
        );
    }
    result
}
