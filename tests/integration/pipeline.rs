//! Integration tests for the ingestion pipeline
//!
//! Sightings travel the whole way: reporter → publisher → bus → bridge → ingest → store, with
//! alerts and republished records coming out the other end.

use std::time::Duration;

use discoverd::{
    actors::collector::CollectorReporter,
    alerts::NEW_DEVICE_MESSAGE,
    device::{Connection, DataUseReport, DeviceRecord},
    store::SessionDetail,
    tracker::DataUseAmount,
    transport::{
        BusMessage, SubSocket, Transport,
        topics::{DEVICE_TOPIC, LLDP_TOPIC},
    },
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_lldp_neigh_nmap_sightings_merge_into_one_device() {
    let engine = TestEngine::start().await;
    let reporter = CollectorReporter::new(engine.publisher.clone());

    reporter.report(lldp_sighting(IP_A, MAC_A)).unwrap();
    reporter.report(neigh_sighting(IP_A, MAC_A)).unwrap();
    reporter.report(nmap_sighting(IP_A, MAC_A)).unwrap();

    let store = engine.store.clone();
    assert!(
        eventually(|| store
            .get_by_mac(MAC_A)
            .is_some_and(|record| !record.lldp.is_empty()
                && !record.neigh.is_empty()
                && !record.nmap.is_empty()))
        .await,
        "sightings never merged"
    );

    let record = engine.store.get_by_mac(MAC_A).unwrap();
    assert_eq!(record.mac_address, MAC_A);
    assert_eq!(record.lldp[IP_A].sys_name, "switch-01");
    assert_eq!(record.neigh[IP_A].state, "REACHABLE");
    assert_eq!(record.nmap[IP_A].hostname, "printer");
    assert_eq!(engine.store.len(), 1);

    let alerts = engine.alerts.alerts();
    assert_eq!(alerts.len(), 1, "exactly one new-device alert");
    assert_eq!(alerts[0].message, NEW_DEVICE_MESSAGE);
    assert_eq!(alerts[0].param("macAddress"), Some(MAC_A));
    assert_eq!(alerts[0].param("ips"), Some(IP_A));
    assert!(alerts[0].timestamp.is_some());

    let stats = engine.ingest.stats().await.unwrap();
    assert_eq!(stats.merged, 3);
    assert_eq!(stats.alerts, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_merged_records_are_republished() {
    let engine = TestEngine::start().await;
    let mut devices = engine
        .bus
        .subscribe(&[DEVICE_TOPIC.to_string()])
        .await
        .unwrap();

    let reporter = CollectorReporter::new(engine.publisher.clone());
    reporter.report(neigh_sighting(IP_A, MAC_A)).unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), devices.recv())
        .await
        .expect("no device record republished")
        .unwrap();
    assert_eq!(message.topic, DEVICE_TOPIC);

    let record: DeviceRecord = message.decode().unwrap();
    assert_eq!(record.mac_address, MAC_A);
    assert!(record.neigh.contains_key(IP_A));

    engine.shutdown().await;
}

#[tokio::test]
async fn test_traffic_reports_fill_session_detail() {
    let engine = TestEngine::start().await;
    let reporter = CollectorReporter::new(engine.publisher.clone());

    reporter.report(neigh_sighting(IP_A, MAC_A)).unwrap();
    let store = engine.store.clone();
    assert!(
        eventually(|| store.get_by_ip(IP_A).is_some()).await,
        "sighting never merged"
    );

    let connection = |server_port, byte_rate| Connection {
        client_address: IP_A.to_string(),
        client_port: 50_000,
        server_address: "10.1.1.1".to_string(),
        server_port,
        protocol: "tcp".to_string(),
        byte_rate,
    };
    reporter
        .report_connections(&[connection(443, 10), connection(22, 30)])
        .unwrap();
    reporter
        .report_data_use(&DataUseReport {
            ip: IP_A.to_string(),
            amount: DataUseAmount { rx: 100, tx: 20 },
        })
        .unwrap();

    assert!(
        eventually(|| store.summaries(&[]).first().is_some_and(|summary| {
            summary.session_detail.num_sessions == 2 && summary.session_detail.rx_total == 100
        }))
        .await,
        "traffic never reached the store"
    );

    let summaries = engine.store.summaries(&[]);
    assert_eq!(summaries.len(), 1);
    assert_eq!(
        summaries[0].session_detail,
        SessionDetail {
            byte_transfer_rate: 40,
            num_sessions: 2,
            data_usage: 120,
            rx_total: 100,
            tx_total: 20,
        }
    );

    let stats = engine.ingest.stats().await.unwrap();
    assert_eq!(stats.traffic_updates, 2);
    assert_eq!(stats.decode_errors, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_malformed_payload_is_skipped() {
    let engine = TestEngine::start().await;

    engine
        .ingest
        .submit(BusMessage::new(LLDP_TOPIC, "{not json"))
        .await
        .unwrap();
    engine
        .ingest
        .submit(BusMessage::json(LLDP_TOPIC, &serde_json::json!({"mac": MAC_A})).unwrap())
        .await
        .unwrap();
    engine
        .ingest
        .submit(
            BusMessage::json(LLDP_TOPIC, &serde_json::json!({"ip": IP_A, "mac": MAC_A})).unwrap(),
        )
        .await
        .unwrap();

    let stats = engine.ingest.stats().await.unwrap();
    assert_eq!(stats.received, 3);
    assert_eq!(stats.decode_errors, 2);
    assert_eq!(stats.merged, 1);
    assert_eq!(engine.store.len(), 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_zero_mac_is_rejected_without_alert() {
    let engine = TestEngine::start().await;

    engine
        .ingest
        .submit(
            BusMessage::json(
                LLDP_TOPIC,
                &serde_json::json!({"ip": IP_A, "mac": "00:00:00:00:00:00"}),
            )
            .unwrap(),
        )
        .await
        .unwrap();

    let stats = engine.ingest.stats().await.unwrap();
    assert_eq!(stats.rejected, 1);
    assert!(engine.store.is_empty());
    assert!(engine.alerts.is_empty());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_ip_only_device_is_rekeyed_when_mac_arrives() {
    let engine = TestEngine::start().await;

    engine
        .ingest
        .submit(BusMessage::json(LLDP_TOPIC, &serde_json::json!({"ip": IP_A})).unwrap())
        .await
        .unwrap();
    engine
        .ingest
        .submit(
            BusMessage::json(LLDP_TOPIC, &serde_json::json!({"ip": IP_A, "mac": MAC_A})).unwrap(),
        )
        .await
        .unwrap();
    engine.ingest.stats().await.unwrap();

    assert_eq!(engine.store.len(), 1);
    assert_eq!(engine.store.get_by_ip(IP_A).unwrap().mac_address, MAC_A);
    assert_eq!(engine.alerts.len(), 1);

    engine.shutdown().await;
}
