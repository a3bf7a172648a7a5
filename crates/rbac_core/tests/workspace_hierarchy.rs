use rbac_core::db::open_db_in_memory;
use rbac_core::repo::workspace_repo::{SqliteWorkspaceRepository, WorkspaceRepository};
use rbac_core::{
    create_relationship, BootstrapConfig, BootstrappedTenant, GraphTenantBootstrapService,
    InMemoryReplicator, NewWorkspace, OutboxReplicator, RelationReplicator, Relationship,
    ReplicationError, ReplicationEvent, ReplicationEventType, Workspace, WorkspaceListQuery,
    WorkspaceService, WorkspaceServiceError, WorkspaceType, WorkspaceUpdate,
};
use rusqlite::Connection;
use std::sync::Arc;

/// Fails every event of one type and accepts the rest.
struct RejectingReplicator {
    rejected: ReplicationEventType,
}

impl RelationReplicator for RejectingReplicator {
    fn replicate(
        &self,
        _conn: &Connection,
        event: &ReplicationEvent,
    ) -> Result<(), ReplicationError> {
        if event.event_type == self.rejected {
            return Err(ReplicationError::Rejected(format!("{} refused", event.event_type)));
        }
        Ok(())
    }
}

fn rejecting(rejected: ReplicationEventType) -> Arc<RejectingReplicator> {
    Arc::new(RejectingReplicator { rejected })
}

fn setup() -> (Connection, Arc<InMemoryReplicator>) {
    (open_db_in_memory().unwrap(), Arc::new(InMemoryReplicator::new()))
}

fn bootstrap(conn: &Connection, org_id: &str) -> BootstrappedTenant {
    GraphTenantBootstrapService::try_new(
        conn,
        &BootstrapConfig::default(),
        Arc::new(InMemoryReplicator::new()),
    )
    .unwrap()
    .get_or_bootstrap_tenant(org_id, None)
    .unwrap()
}

fn builtin(conn: &Connection, tenant_id: i64, kind: WorkspaceType) -> Workspace {
    SqliteWorkspaceRepository::new(conn)
        .get_builtin(tenant_id, kind)
        .unwrap()
        .unwrap()
}

fn named(name: &str) -> NewWorkspace {
    NewWorkspace {
        name: name.to_string(),
        ..NewWorkspace::default()
    }
}

fn outbox_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM replication_outbox;", [], |row| row.get(0))
        .unwrap()
}

fn workspace_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM workspaces;", [], |row| row.get(0))
        .unwrap()
}

fn parent_edge(child: &Workspace, parent: uuid::Uuid) -> Relationship {
    create_relationship(
        ("rbac", "workspace"),
        child.uuid.to_string(),
        ("rbac", "workspace"),
        parent.to_string(),
        "parent",
    )
}

#[test]
fn create_workspace_defaults_parent_to_default_workspace() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();

    let created = service
        .create_workspace(&tenant, &named("  Engineering  "))
        .unwrap();

    let default = builtin(&conn, tenant.id, WorkspaceType::Default);
    assert_eq!(created.name, "Engineering");
    assert_eq!(created.kind, WorkspaceType::Standard);
    assert_eq!(created.parent_uuid, Some(default.uuid));

    let events = replicator.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ReplicationEventType::CreateWorkspace);
    assert_eq!(
        events[0].add,
        vec![create_relationship(
            ("rbac", "workspace"),
            created.uuid.to_string(),
            ("rbac", "workspace"),
            default.uuid.to_string(),
            "parent",
        )]
    );
}

#[test]
fn duplicate_name_under_same_parent_is_a_validation_error_without_event() {
    let conn = open_db_in_memory().unwrap();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        Arc::new(OutboxReplicator::new()),
    )
    .unwrap();

    service.create_workspace(&tenant, &named("Engineering")).unwrap();
    let before = outbox_count(&conn);

    let err = service
        .create_workspace(&tenant, &named("Engineering"))
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::DuplicateName));
    assert!(err.is_validation());
    assert_eq!(
        err.to_string(),
        "Can't create workspace with same name within same parent workspace"
    );
    assert_eq!(outbox_count(&conn), before);
    assert_eq!(
        conn.query_row(
            "SELECT COUNT(*) FROM workspaces WHERE name = 'Engineering';",
            [],
            |row| row.get::<_, i64>(0)
        )
        .unwrap(),
        1
    );
}

#[test]
fn same_name_under_different_parents_is_allowed() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator).unwrap();

    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    let nested = service
        .create_workspace(
            &tenant,
            &NewWorkspace {
                parent_uuid: Some(team.uuid),
                ..named("Team")
            },
        )
        .unwrap();

    assert_eq!(nested.parent_uuid, Some(team.uuid));
}

#[test]
fn blank_name_and_foreign_parent_are_rejected() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let other = bootstrap(&conn, "67890").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();

    let blank = service.create_workspace(&tenant, &named("   ")).unwrap_err();
    assert!(matches!(blank, WorkspaceServiceError::InvalidName));

    let foreign_parent = builtin(&conn, other.id, WorkspaceType::Default).uuid;
    let err = service
        .create_workspace(
            &tenant,
            &NewWorkspace {
                parent_uuid: Some(foreign_parent),
                ..named("Leak")
            },
        )
        .unwrap_err();
    assert!(matches!(err, WorkspaceServiceError::ParentNotFound(uuid) if uuid == foreign_parent));
    assert!(replicator.events().is_empty());
}

#[test]
fn builtin_workspaces_are_never_deletable() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let root = builtin(&conn, tenant.id, WorkspaceType::Root);
    let default = builtin(&conn, tenant.id, WorkspaceType::Default);

    let root_err = service.delete_workspace(root.uuid).unwrap_err();
    let default_err = service.delete_workspace(default.uuid).unwrap_err();

    assert!(matches!(
        root_err,
        WorkspaceServiceError::NotDeletable(WorkspaceType::Root)
    ));
    assert_eq!(default_err.to_string(), "Unable to delete default workspace");
    assert!(replicator.events().is_empty());
}

#[test]
fn workspace_with_child_cannot_be_deleted() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let parent = service.create_workspace(&tenant, &named("Parent")).unwrap();
    service
        .create_workspace(
            &tenant,
            &NewWorkspace {
                parent_uuid: Some(parent.uuid),
                ..named("Child")
            },
        )
        .unwrap();
    replicator.take();

    let err = service.delete_workspace(parent.uuid).unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::HasDependencies(_)));
    assert_eq!(err.to_string(), "Unable to delete due to workspace dependencies");
    assert!(service.get_workspace(parent.uuid).is_ok());
    assert!(replicator.events().is_empty());
}

#[test]
fn deleting_leaf_workspace_replicates_removed_parent_edge() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let leaf = service.create_workspace(&tenant, &named("Leaf")).unwrap();
    replicator.take();

    service.ensure_deletable(leaf.uuid).unwrap();
    service.delete_workspace(leaf.uuid).unwrap();

    assert!(matches!(
        service.get_workspace(leaf.uuid),
        Err(WorkspaceServiceError::NotFound(_))
    ));
    let events = replicator.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ReplicationEventType::DeleteWorkspace);
    assert_eq!(
        events[0].info.get("workspace_uuid").map(String::as_str),
        Some(leaf.uuid.to_string().as_str())
    );
    assert!(events[0].add.is_empty());
    assert_eq!(
        events[0].remove,
        vec![create_relationship(
            ("rbac", "workspace"),
            leaf.uuid.to_string(),
            ("rbac", "workspace"),
            leaf.parent_uuid.unwrap().to_string(),
            "parent",
        )]
    );
}

#[test]
fn deleting_unknown_workspace_is_not_found() {
    let (conn, replicator) = setup();
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator).unwrap();

    let err = service.delete_workspace(uuid::Uuid::new_v4()).unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::NotFound(_)));
    assert!(!err.is_validation());
}

#[test]
fn ancestry_walks_up_to_root() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator).unwrap();
    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    let project = service
        .create_workspace(
            &tenant,
            &NewWorkspace {
                parent_uuid: Some(team.uuid),
                ..named("Project")
            },
        )
        .unwrap();

    let kinds: Vec<(String, WorkspaceType)> = service
        .ancestry(project.uuid)
        .unwrap()
        .into_iter()
        .map(|workspace| (workspace.name, workspace.kind))
        .collect();

    assert_eq!(
        kinds,
        vec![
            ("Team".to_string(), WorkspaceType::Standard),
            ("Default Workspace".to_string(), WorkspaceType::Default),
            ("Root Workspace".to_string(), WorkspaceType::Root),
        ]
    );
    assert!(service
        .ancestry(builtin(&conn, tenant.id, WorkspaceType::Root).uuid)
        .unwrap()
        .is_empty());
}

#[test]
fn list_filters_by_type_and_case_insensitive_name() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let other = bootstrap(&conn, "67890").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator).unwrap();
    service.create_workspace(&tenant, &named("Beta")).unwrap();
    service.create_workspace(&tenant, &named("Alpha")).unwrap();
    service.create_workspace(&other, &named("Alpha")).unwrap();

    let all = service
        .list_workspaces(&tenant, &WorkspaceListQuery::default())
        .unwrap();
    let names: Vec<&str> = all.iter().map(|workspace| workspace.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Alpha", "Beta", "Default Workspace", "Root Workspace"]
    );

    let standard = service
        .list_workspaces(
            &tenant,
            &WorkspaceListQuery {
                kind: Some(WorkspaceType::Standard),
                name: None,
            },
        )
        .unwrap();
    assert_eq!(standard.len(), 2);

    let alpha = service
        .list_workspaces(
            &tenant,
            &WorkspaceListQuery {
                kind: None,
                name: Some("ALPHA".to_string()),
            },
        )
        .unwrap();
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].tenant_id, tenant.id);
}

#[test]
fn blank_name_filter_lists_everything() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator).unwrap();
    service.create_workspace(&tenant, &named("Alpha")).unwrap();

    let listed = service
        .list_workspaces(
            &tenant,
            &WorkspaceListQuery {
                kind: None,
                name: Some("   ".to_string()),
            },
        )
        .unwrap();

    assert_eq!(listed.len(), 3);
}

#[test]
fn rejected_create_event_rolls_back_the_workspace_row() {
    let conn = open_db_in_memory().unwrap();
    let tenant = bootstrap(&conn, "12345").tenant;
    let before = workspace_count(&conn);
    let service = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        rejecting(ReplicationEventType::CreateWorkspace),
    )
    .unwrap();

    let err = service
        .create_workspace(&tenant, &named("Engineering"))
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::Replication(_)));
    assert!(!err.is_validation());
    assert_eq!(workspace_count(&conn), before);
}

#[test]
fn rejected_delete_event_keeps_the_workspace() {
    let conn = open_db_in_memory().unwrap();
    let tenant = bootstrap(&conn, "12345").tenant;
    let leaf = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        Arc::new(InMemoryReplicator::new()),
    )
    .unwrap()
    .create_workspace(&tenant, &named("Leaf"))
    .unwrap();
    let service = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        rejecting(ReplicationEventType::DeleteWorkspace),
    )
    .unwrap();

    let err = service.delete_workspace(leaf.uuid).unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::Replication(_)));
    assert_eq!(service.get_workspace(leaf.uuid).unwrap(), leaf);
}

#[test]
fn rename_and_describe_change_the_row_without_an_event() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    replicator.take();

    let updated = service
        .update_workspace(
            team.uuid,
            &WorkspaceUpdate {
                name: Some("  Platform  ".to_string()),
                description: Some("infra".to_string()),
                parent_uuid: team.parent_uuid,
            },
        )
        .unwrap();

    assert_eq!(updated.name, "Platform");
    assert_eq!(updated.description.as_deref(), Some("infra"));
    assert_eq!(updated.parent_uuid, team.parent_uuid);
    assert_eq!(updated.created_at, team.created_at);
    assert_eq!(service.get_workspace(team.uuid).unwrap(), updated);
    assert!(replicator.events().is_empty());
}

#[test]
fn rename_onto_sibling_name_is_duplicate() {
    let conn = open_db_in_memory().unwrap();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        Arc::new(OutboxReplicator::new()),
    )
    .unwrap();
    service.create_workspace(&tenant, &named("Alpha")).unwrap();
    let beta = service.create_workspace(&tenant, &named("Beta")).unwrap();
    let before = outbox_count(&conn);

    let err = service
        .update_workspace(
            beta.uuid,
            &WorkspaceUpdate {
                name: Some("Alpha".to_string()),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::DuplicateName));
    assert!(err.is_validation());
    assert_eq!(service.get_workspace(beta.uuid).unwrap().name, "Beta");
    assert_eq!(outbox_count(&conn), before);
}

#[test]
fn moving_workspace_replicates_old_and_new_parent_edges() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    let project = service.create_workspace(&tenant, &named("Project")).unwrap();
    let old_parent = project.parent_uuid.unwrap();
    replicator.take();

    let moved = service
        .update_workspace(
            project.uuid,
            &WorkspaceUpdate {
                parent_uuid: Some(team.uuid),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap();

    assert_eq!(moved.parent_uuid, Some(team.uuid));
    assert_eq!(moved.name, "Project");
    let events = replicator.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ReplicationEventType::UpdateWorkspace);
    assert_eq!(
        events[0].info.get("workspace_uuid").map(String::as_str),
        Some(project.uuid.to_string().as_str())
    );
    assert_eq!(
        events[0].info.get("org_id").map(String::as_str),
        Some("12345")
    );
    assert_eq!(events[0].remove, vec![parent_edge(&project, old_parent)]);
    assert_eq!(events[0].add, vec![parent_edge(&project, team.uuid)]);
    assert_eq!(
        service
            .ancestry(project.uuid)
            .unwrap()
            .first()
            .map(|workspace| workspace.uuid),
        Some(team.uuid)
    );
}

#[test]
fn workspace_cannot_become_its_own_parent() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    replicator.take();

    let err = service
        .update_workspace(
            team.uuid,
            &WorkspaceUpdate {
                parent_uuid: Some(team.uuid),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::SelfParent));
    assert_eq!(err.to_string(), "Parent ID and ID can't be same");
    assert!(replicator.events().is_empty());
}

#[test]
fn workspace_cannot_move_under_its_descendant() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    let project = service
        .create_workspace(
            &tenant,
            &NewWorkspace {
                parent_uuid: Some(team.uuid),
                ..named("Project")
            },
        )
        .unwrap();
    let task = service
        .create_workspace(
            &tenant,
            &NewWorkspace {
                parent_uuid: Some(project.uuid),
                ..named("Task")
            },
        )
        .unwrap();
    replicator.take();

    let err = service
        .update_workspace(
            team.uuid,
            &WorkspaceUpdate {
                parent_uuid: Some(task.uuid),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::ParentIsDescendant(uuid) if uuid == task.uuid));
    assert!(err.is_validation());
    assert_eq!(service.get_workspace(team.uuid).unwrap(), team);
    assert!(replicator.events().is_empty());
}

#[test]
fn update_rejects_foreign_parent_builtins_and_unknown_ids() {
    let (conn, replicator) = setup();
    let tenant = bootstrap(&conn, "12345").tenant;
    let other = bootstrap(&conn, "67890").tenant;
    let service =
        WorkspaceService::try_new(&conn, &BootstrapConfig::default(), replicator.clone()).unwrap();
    let team = service.create_workspace(&tenant, &named("Team")).unwrap();
    replicator.take();

    let foreign_parent = builtin(&conn, other.id, WorkspaceType::Default).uuid;
    let foreign = service
        .update_workspace(
            team.uuid,
            &WorkspaceUpdate {
                parent_uuid: Some(foreign_parent),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(foreign, WorkspaceServiceError::ParentNotFound(uuid) if uuid == foreign_parent));

    let default = builtin(&conn, tenant.id, WorkspaceType::Default);
    let renamed_default = service
        .update_workspace(
            default.uuid,
            &WorkspaceUpdate {
                name: Some("Renamed".to_string()),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(
        renamed_default,
        WorkspaceServiceError::NotUpdatable(WorkspaceType::Default)
    ));

    let blank = service
        .update_workspace(
            team.uuid,
            &WorkspaceUpdate {
                name: Some(" ".to_string()),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(blank, WorkspaceServiceError::InvalidName));

    let missing = service
        .update_workspace(uuid::Uuid::new_v4(), &WorkspaceUpdate::default())
        .unwrap_err();
    assert!(matches!(missing, WorkspaceServiceError::NotFound(_)));

    assert_eq!(service.get_workspace(team.uuid).unwrap(), team);
    assert_eq!(builtin(&conn, tenant.id, WorkspaceType::Default), default);
    assert!(replicator.events().is_empty());
}

#[test]
fn rejected_update_event_keeps_the_old_parent() {
    let conn = open_db_in_memory().unwrap();
    let tenant = bootstrap(&conn, "12345").tenant;
    let setup_service = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        Arc::new(InMemoryReplicator::new()),
    )
    .unwrap();
    let team = setup_service.create_workspace(&tenant, &named("Team")).unwrap();
    let project = setup_service
        .create_workspace(&tenant, &named("Project"))
        .unwrap();
    let service = WorkspaceService::try_new(
        &conn,
        &BootstrapConfig::default(),
        rejecting(ReplicationEventType::UpdateWorkspace),
    )
    .unwrap();

    let err = service
        .update_workspace(
            project.uuid,
            &WorkspaceUpdate {
                name: Some("Moved".to_string()),
                parent_uuid: Some(team.uuid),
                ..WorkspaceUpdate::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, WorkspaceServiceError::Replication(_)));
    assert_eq!(service.get_workspace(project.uuid).unwrap(), project);
}
