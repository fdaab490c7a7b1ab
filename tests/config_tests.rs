mod test_support;

use drover_agent::config::{AgentConfig, DEFAULT_RESOURCES, PUBLIC_DNS_ENV};
use drover_agent::messages::{MasterMessage, Outbound};

#[test]
fn test_defaults() {
    let conf = AgentConfig::default();
    assert_eq!(conf.resources, DEFAULT_RESOURCES);
    assert_eq!(conf.resources, "cpus:1;mem:1024");
    assert!(conf.switch_user);
    assert!(conf.master.is_none());
    assert!(conf.http_addr.is_none());
    assert!(conf.work_dir.ends_with("work"));
}

#[test]
fn test_attributes_map_parsing() {
    let mut conf = AgentConfig::default();
    conf.attributes = "rack:r1;zone:z2;malformed".to_string();

    let attributes = conf.attributes_map();
    assert_eq!(attributes.len(), 2);
    assert_eq!(attributes["rack"], "r1");
    assert_eq!(attributes["zone"], "z2");
}

#[test]
fn test_vars_dump_carries_configuration() {
    let conf = AgentConfig::default()
        .with_resources("cpus:2;mem:512")
        .with_master("master-a:5050");

    let vars = conf.vars();
    let get = |key: &str| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(get("resources").unwrap(), "cpus:2;mem:512");
    assert_eq!(get("master").unwrap(), "master-a:5050");
    assert_eq!(get("switch_user").unwrap(), "true");
    assert!(get("listen_addr").is_some());
}

#[tokio::test]
async fn test_public_dns_override_is_advertised() {
    std::env::set_var(PUBLIC_DNS_ENV, "public.example.com");
    let mut agent = test_support::test_agent("cpus:1;mem:64");
    std::env::remove_var(PUBLIC_DNS_ENV);

    agent
        .slave
        .new_master_detected("master-a:5050".to_string())
        .await;

    match agent.outbound.try_recv().unwrap() {
        Outbound::Master {
            message: MasterMessage::RegisterSlave { slave },
            ..
        } => {
            assert_eq!(slave.public_hostname, "public.example.com");
            assert_ne!(slave.hostname, "public.example.com");
        }
        other => panic!("unexpected outbound message: {other:?}"),
    }
}

#[tokio::test]
async fn test_attributes_reach_the_master() {
    let work_dir = tempfile::TempDir::new().unwrap();
    let mut conf = AgentConfig::default()
        .with_resources("cpus:1;mem:64")
        .with_work_dir(work_dir.path());
    conf.attributes = "rack:r1".to_string();

    let (outbound_tx, mut outbound_rx) = tokio::sync::mpsc::channel(16);
    let (isolation_tx, _isolation_rx) = tokio::sync::mpsc::channel(16);
    let (mut slave, _tx, _rx) =
        drover_agent::slave::Slave::new(conf, outbound_tx, isolation_tx).unwrap();

    slave.new_master_detected("master-a:5050".to_string()).await;

    match outbound_rx.try_recv().unwrap() {
        Outbound::Master {
            message: MasterMessage::RegisterSlave { slave },
            ..
        } => {
            assert_eq!(slave.attributes["rack"], "r1");
        }
        other => panic!("unexpected outbound message: {other:?}"),
    }
}
