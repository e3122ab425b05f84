use ha_policy_engine::{
    api::status_dto::cluster_dto::ClusterStatusDto,
    compute_transition_graph,
    domain::cluster::{NoQuorumPolicy, Role, build_working_set},
    domain::fencing::FencingCoordinator,
    error::Error,
    loader::parser::{parse_json_file, parse_json_str},
};

fn fixture(name: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_load_steady_cluster() -> anyhow::Result<()> {
    let status: ClusterStatusDto = parse_json_file(fixture("steady_cluster.json"))?;
    let ws = build_working_set(&status, None)?;

    assert_eq!(ws.nodes.len(), 3);
    // group, its two members, db, ping and drbd
    assert_eq!(ws.resources.len(), 6);
    assert_eq!(ws.options.no_quorum_policy, NoQuorumPolicy::Stop);
    assert!(ws.have_quorum);

    let dc = ws.dc_node.expect("alpha is the DC");
    assert_eq!(ws.node_name(dc), "alpha");

    let drbd = ws.find_resource("drbd").expect("drbd is configured");
    assert_eq!(ws.resources[drbd].role, Role::Slave);
    assert_eq!(ws.resources[drbd].target_role, Some(Role::Master));

    // implicit member colocation and ordering, plus the configured ones
    assert_eq!(ws.colocations.len(), 2);
    assert_eq!(ws.orderings.len(), 2);
    Ok(())
}

#[test]
fn test_unknown_node_is_rejected() {
    let result = compute_transition_graph(&fixture("unknown_node.json"), None, FencingCoordinator::unavailable());
    match result {
        Err(Error::InvalidSnapshot(message)) => assert!(message.contains("n9")),
        other => panic!("expected an invalid snapshot, got {:?}", other),
    }
}

#[test]
fn test_missing_file_is_an_io_error() {
    let result = compute_transition_graph(&fixture("does_not_exist.json"), None, FencingCoordinator::unavailable());
    assert!(matches!(result, Err(Error::IoError(_))));
}

#[test]
fn test_malformed_json_is_rejected() {
    let result = parse_json_str::<ClusterStatusDto>(r#"{"nodes": [{"online": true}]}"#);
    assert!(matches!(result, Err(Error::DeserializationError(_))));
}

#[test]
fn test_unknown_policy_is_a_configuration_error() {
    let status: ClusterStatusDto = parse_json_str(r#"{"config": {"noQuorumPolicy": "panic"}, "nodes": []}"#).unwrap();
    let err = build_working_set(&status, None).unwrap_err();
    assert!(err.is_configuration_error());
    assert!(err.to_string().contains("panic"));
}

#[test]
fn test_duplicate_resources_are_rejected() {
    let status: ClusterStatusDto = parse_json_str(
        r#"{
            "nodes": [{"id": "n1", "online": true}],
            "resources": [{"id": "web"}, {"id": "web"}]
        }"#,
    )
    .unwrap();
    assert!(matches!(build_working_set(&status, None), Err(Error::InvalidSnapshot(_))));
}
