//! Integration tests for the control plane
//!
//! A real server on a random port, driven through [`ControlClient`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use discoverd::{
    actors::{
        collector::{CollectorRegistry, FnCollector, SchedulerHandle},
        messages::{CollectorName, Command, CommandKind},
        publisher::PublisherHandle,
    },
    control::{ControlClient, ControlState, ResponseCode, spawn_control_server},
    device::DeviceRecord,
    store::DeviceStore,
    transport::{LocalBus, SubSocket, Transport, topics::DEVICE_TOPIC},
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::Value;

use crate::helpers::*;

struct TestServer {
    addr: SocketAddr,
    client: ControlClient,
    store: Arc<DeviceStore>,
    bus: LocalBus,
    calls: Arc<Mutex<Vec<(CollectorName, Vec<Command>)>>>,
}

async fn spawn_test_server() -> TestServer {
    let bus = LocalBus::new(64);
    let publisher = PublisherHandle::spawn(Arc::new(bus.clone()), test_publisher_config(64));
    let store = Arc::new(DeviceStore::new());
    let registry = Arc::new(CollectorRegistry::new());
    let calls = Arc::new(Mutex::new(Vec::new()));

    for name in [CollectorName::NMAP, CollectorName::LLDP] {
        let calls = calls.clone();
        let collector_name = name.clone();
        registry.register(
            name,
            Arc::new(FnCollector(move |commands: Vec<Command>| {
                calls.lock().push((collector_name.clone(), commands));
            })),
        );
    }

    let scheduler = SchedulerHandle::spawn(registry.clone(), Duration::from_secs(3600));
    let state = ControlState::new(store.clone(), registry, scheduler, publisher);

    let addr = spawn_control_server("127.0.0.1:0".parse().unwrap(), state)
        .await
        .unwrap();
    let client = ControlClient::new(format!("http://{addr}")).unwrap();

    TestServer {
        addr,
        client,
        store,
        bus,
        calls,
    }
}

#[tokio::test]
async fn test_health() {
    let server = spawn_test_server().await;

    let health = server.client.health().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.devices, 0);
    assert_eq!(
        health.collectors,
        vec![CollectorName::LLDP, CollectorName::NMAP]
    );
}

#[tokio::test]
async fn test_scan_net_reaches_collectors() {
    let server = spawn_test_server().await;

    let response = server
        .client
        .scan_net(vec!["10.0.0.0/24".to_string(), "10.1.0.0/16".to_string()])
        .await
        .unwrap();
    assert_eq!(response.result, ResponseCode::Ok);

    let calls = server.calls.clone();
    assert!(eventually(|| calls.lock().len() == 2).await);

    for (_, commands) in server.calls.lock().iter() {
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, CommandKind::ScanNet);
        assert_eq!(commands[0].arguments, vec!["10.0.0.0/24", "10.1.0.0/16"]);
    }
}

#[tokio::test]
async fn test_scan_net_rejects_bad_networks() {
    let server = spawn_test_server().await;

    let empty = server.client.scan_net(vec![]).await.unwrap();
    assert_eq!(empty.result, ResponseCode::InvalidRequest);

    let invalid = server
        .client
        .scan_net(vec!["10.0.0.0/24".to_string(), "not-a-net".to_string()])
        .await
        .unwrap();
    assert_eq!(invalid.result, ResponseCode::InvalidRequest);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.calls.lock().is_empty());
}

#[tokio::test]
async fn test_scan_host() {
    let server = spawn_test_server().await;

    let response = server
        .client
        .scan_host(vec!["printer.lan".to_string()])
        .await
        .unwrap();
    assert_eq!(response.result, ResponseCode::Ok);

    let calls = server.calls.clone();
    assert!(eventually(|| calls.lock().len() == 2).await);
    assert!(
        server
            .calls
            .lock()
            .iter()
            .all(|(_, commands)| commands[0].kind == CommandKind::ScanHost)
    );

    let rejected = server.client.scan_host(vec![]).await.unwrap();
    assert_eq!(rejected.result, ResponseCode::InvalidRequest);
}

#[tokio::test]
async fn test_call_selected_collectors() {
    let server = spawn_test_server().await;

    let response = server
        .client
        .call_collectors(vec![CollectorName::NMAP], vec![])
        .await
        .unwrap();
    assert_eq!(response.result, ResponseCode::Ok);
    assert_eq!(response.called, 1);

    let calls = server.calls.clone();
    assert!(eventually(|| calls.lock().len() == 1).await);
    assert_eq!(server.calls.lock()[0].0, CollectorName::NMAP);

    let everyone = server
        .client
        .call_collectors(vec![CollectorName::ALL], vec![])
        .await
        .unwrap();
    assert_eq!(everyone.called, 2);
}

#[tokio::test]
async fn test_request_all_entries_republishes_inventory() {
    let server = spawn_test_server().await;
    server
        .store
        .merge_or_add(DeviceRecord::with_mac(MAC_A))
        .unwrap();
    server
        .store
        .merge_or_add(DeviceRecord::with_mac("aa:bb:cc:dd:ee:02"))
        .unwrap();

    let mut devices = server
        .bus
        .subscribe(&[DEVICE_TOPIC.to_string()])
        .await
        .unwrap();

    let response = server.client.request_all_entries().await.unwrap();
    assert_eq!(response.result, ResponseCode::Ok);

    let mut macs = Vec::new();
    for _ in 0..2 {
        let message = tokio::time::timeout(Duration::from_secs(2), devices.recv())
            .await
            .expect("inventory not republished")
            .unwrap();
        let record: DeviceRecord = message.decode().unwrap();
        macs.push(record.mac_address);
    }
    macs.sort();
    assert_eq!(macs, vec![MAC_A.to_string(), "aa:bb:cc:dd:ee:02".to_string()]);
}

#[tokio::test]
async fn test_device_queries() {
    let server = spawn_test_server().await;
    let mut record = DeviceRecord::with_mac(MAC_A);
    record.ipv4_address = IP_A.to_string();
    server.store.merge_or_add(record).unwrap();

    let http = reqwest::Client::new();

    let devices: Value = http
        .get(format!("http://{}/api/v1/devices", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(devices.as_array().unwrap().len(), 1);
    assert_eq!(devices[0]["macAddress"], MAC_A);
    assert_eq!(devices[0]["sessionDetail"]["numSessions"], 0);

    let recent: Value = http
        .get(format!(
            "http://{}/api/v1/devices?updated_within_secs=60",
            server.addr
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(recent.as_array().unwrap().len(), 1);

    let by_ip: DeviceRecord = http
        .get(format!("http://{}/api/v1/devices/ip/{IP_A}", server.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(by_ip.mac_address, MAC_A);

    let missing = http
        .get(format!("http://{}/api/v1/devices/ip/10.9.9.9", server.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let negative = http
        .get(format!(
            "http://{}/api/v1/devices?updated_within_secs=-5",
            server.addr
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);
}
