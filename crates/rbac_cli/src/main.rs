//! CLI entry point: bootstraps one organization with the graph strategy.
//!
//! Usage: `rbac_cli <db_path> <org_id> [account_number]`
//!
//! `RBAC_CONFIG` may hold bootstrap configuration JSON. Missing fields use
//! defaults. A config selecting the `legacy` strategy is refused.

use log::error;
use rbac_core::{
    init_logging, open_db, replicator_from_config, BootstrapConfig, BootstrapStrategy,
    GraphTenantBootstrapService, LoggingConfig,
};
use std::process::ExitCode;

const USAGE: &str = "usage: rbac_cli <db_path> <org_id> [account_number] (graph strategy only)";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, org_id, account) = match args.as_slice() {
        [db_path, org_id] => (db_path, org_id, None),
        [db_path, org_id, account] => (db_path, org_id, Some(account.as_str())),
        _ => {
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = init_logging(&LoggingConfig::default()) {
        eprintln!("logging disabled: {err}");
    }

    match run(db_path, org_id, account) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_bootstrap module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    db_path: &str,
    org_id: &str,
    account: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::var("RBAC_CONFIG") {
        Ok(raw) => BootstrapConfig::from_json_str(&raw)?,
        Err(_) => BootstrapConfig::default(),
    };
    ensure_graph_strategy(&config)?;

    let conn = open_db(db_path)?;
    let replicator = replicator_from_config(config.replicator);
    let service = GraphTenantBootstrapService::try_new(&conn, &config, replicator)?;
    let bootstrapped = service.get_or_bootstrap_tenant(org_id, account)?;

    println!("tenant_id={}", bootstrapped.tenant.id);
    println!("tenant_name={}", bootstrapped.tenant.tenant_name);
    if let Some(mapping) = bootstrapped.mapping {
        println!("default_group_uuid={}", mapping.default_group_uuid);
        println!("default_admin_group_uuid={}", mapping.default_admin_group_uuid);
        println!(
            "default_user_role_binding_uuid={}",
            mapping.default_user_role_binding_uuid
        );
        println!(
            "default_admin_role_binding_uuid={}",
            mapping.default_admin_role_binding_uuid
        );
    }
    println!("rbac_core version={}", rbac_core::core_version());
    Ok(())
}

/// Legacy tenants have no mapping or workspaces for this command to print.
fn ensure_graph_strategy(config: &BootstrapConfig) -> Result<(), String> {
    match config.strategy {
        BootstrapStrategy::GraphAware => Ok(()),
        BootstrapStrategy::Legacy => Err(concat!(
            "rbac_cli only bootstraps with the graph strategy; ",
            "set \"strategy\": \"graph_aware\" in RBAC_CONFIG"
        )
        .to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::ensure_graph_strategy;
    use rbac_core::{BootstrapConfig, BootstrapStrategy};

    #[test]
    fn default_config_is_accepted() {
        assert!(ensure_graph_strategy(&BootstrapConfig::default()).is_ok());
    }

    #[test]
    fn legacy_strategy_is_refused_with_a_hint() {
        let config = BootstrapConfig {
            strategy: BootstrapStrategy::Legacy,
            ..BootstrapConfig::default()
        };

        let err = ensure_graph_strategy(&config).unwrap_err();

        assert!(err.contains("graph strategy"));
        assert!(err.contains("RBAC_CONFIG"));
    }
}
