use rbac_core::db::{atomic, open_db_in_memory};
use rbac_core::{
    create_relationship, replicator_from_config, BootstrapConfig, GraphTenantBootstrapService,
    OutboxReplicator, RelationReplicator, ReplicationError, ReplicationEvent,
    ReplicationEventType, ReplicatorKind,
};
use rusqlite::Connection;

fn event(workspace: &str) -> ReplicationEvent {
    ReplicationEvent::new(ReplicationEventType::CreateWorkspace, "rbactodo")
        .with_info("workspace_uuid", workspace)
        .with_add(vec![create_relationship(
            ("rbac", "workspace"),
            workspace,
            ("rbac", "workspace"),
            "parent-ws",
            "parent",
        )])
}

fn outbox_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM replication_outbox;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn outbox_refuses_autocommit_connection() {
    let conn = open_db_in_memory().unwrap();

    let err = OutboxReplicator::new()
        .replicate(&conn, &event("ws-1"))
        .unwrap_err();

    assert!(matches!(err, ReplicationError::Rejected(_)));
    assert_eq!(outbox_count(&conn), 0);
}

#[test]
fn pending_events_are_returned_oldest_first_until_delivered() {
    let conn = open_db_in_memory().unwrap();
    let replicator = OutboxReplicator::new();
    atomic(&conn, |tx| -> Result<(), ReplicationError> {
        replicator.replicate(tx, &event("ws-1"))?;
        replicator.replicate(tx, &event("ws-2"))?;
        Ok(())
    })
    .unwrap();

    let pending = OutboxReplicator::pending_events(&conn, 10).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending[0].id < pending[1].id);
    assert_eq!(pending[0].event, event("ws-1"));
    assert_eq!(pending[1].event, event("ws-2"));

    assert!(OutboxReplicator::mark_delivered(&conn, pending[0].id).unwrap());
    assert!(!OutboxReplicator::mark_delivered(&conn, pending[0].id).unwrap());
    assert!(!OutboxReplicator::mark_delivered(&conn, 9_999).unwrap());

    let remaining = OutboxReplicator::pending_events(&conn, 10).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, pending[1].id);

    let limited = OutboxReplicator::pending_events(&conn, 0).unwrap();
    assert!(limited.is_empty());
}

#[test]
fn rolled_back_transaction_leaves_no_outbox_row() {
    let conn = open_db_in_memory().unwrap();
    let replicator = OutboxReplicator::new();

    let result = atomic(&conn, |tx| -> Result<(), ReplicationError> {
        replicator.replicate(tx, &event("ws-1"))?;
        Err(ReplicationError::Rejected("transport down".to_string()))
    });

    assert!(result.is_err());
    assert_eq!(outbox_count(&conn), 0);
}

#[test]
fn payload_uses_wire_names() {
    let conn = open_db_in_memory().unwrap();
    let replicator = OutboxReplicator::new();
    atomic(&conn, |tx| replicator.replicate(tx, &event("ws-1"))).unwrap();

    let (event_type, partition_key, payload): (String, String, String) = conn
        .query_row(
            "SELECT event_type, partition_key, payload FROM replication_outbox;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(event_type, "CREATE_WORKSPACE");
    assert_eq!(partition_key, "rbactodo");

    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["type"], "CREATE_WORKSPACE");
    assert_eq!(json["info"]["workspace_uuid"], "ws-1");
    assert_eq!(json["add"].as_array().unwrap().len(), 1);
    assert!(json["remove"].as_array().unwrap().is_empty());
}

#[test]
fn noop_replicator_from_config_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let config = BootstrapConfig {
        replicator: ReplicatorKind::Noop,
        ..BootstrapConfig::default()
    };
    let replicator = replicator_from_config(config.replicator);

    GraphTenantBootstrapService::try_new(&conn, &config, replicator)
        .unwrap()
        .get_or_bootstrap_tenant("12345", None)
        .unwrap();

    assert_eq!(outbox_count(&conn), 0);
    let mappings: i64 = conn
        .query_row("SELECT COUNT(*) FROM tenant_mappings;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mappings, 1);
}

#[test]
fn outbox_replicator_from_config_persists_bootstrap_event() {
    let conn = open_db_in_memory().unwrap();
    let config = BootstrapConfig::default();
    let replicator = replicator_from_config(config.replicator);

    GraphTenantBootstrapService::try_new(&conn, &config, replicator)
        .unwrap()
        .get_or_bootstrap_tenant("12345", None)
        .unwrap();

    let pending = OutboxReplicator::pending_events(&conn, 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].event.event_type,
        ReplicationEventType::BootstrapTenant
    );
    assert_eq!(
        pending[0].event.info.get("org_id").map(String::as_str),
        Some("12345")
    );
}
