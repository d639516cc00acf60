use axpert_bridge::connector::UsbHidConnector;
use axpert_bridge::prelude::*;

use std::io::Write;
use std::time::Duration;

/// A named pipe standing in for `/dev/hidraw*`. Opened read/write by the
/// connector, so whatever it writes can be read back from the same node.
fn fifo(dir: &tempfile::TempDir, name: &str) -> String {
    let path = dir.path().join(name);
    let status = std::process::Command::new("mkfifo")
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());
    path.to_string_lossy().to_string()
}

fn connector_for(devices: &[&str], max_retries: u32) -> UsbHidConnector {
    let yaml = format!(
        "connector: {{ kind: usb, devices: [{}], read_timeout_ms: 100, retry: {{ max_retries: {}, delay_ms: 10 }} }}",
        devices.join(", "),
        max_retries
    );
    let config = Config::from_yaml(&yaml).unwrap();
    UsbHidConnector::new(config.connector())
}

#[tokio::test]
async fn reads_reports_until_terminator() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw0");

    let mut connector = connector_for(&[path.as_str()], 0);
    connector.open().await.unwrap();
    assert_eq!(connector.path(), Some(path.as_str()));

    let mut inverter = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    inverter.write_all(b"(B\xe7\xc9\r\0\0\0(NAKss\r\0").unwrap();

    let data = connector.read(5).await.unwrap();
    assert_eq!(data, b"(B\xe7\xc9\r");
}

#[tokio::test]
async fn writes_land_on_the_device() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw0");

    let mut connector = connector_for(&[path.as_str()], 0);
    connector.open().await.unwrap();

    let frame = Frame::new("QPIGS", None);
    connector.write_frame(&frame).await.unwrap();

    assert_eq!(connector.read(16).await.unwrap(), frame.bytes());
}

#[tokio::test]
async fn silent_read_does_not_hold_up_the_next_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw0");

    let mut connector = connector_for(&[path.as_str()], 0);
    connector.open().await.unwrap();

    // nothing queued: the read gives up after read_timeout_ms
    assert!(connector.read(5).await.unwrap().is_empty());

    let frame = Frame::new("QMOD", None);
    let written = tokio::time::timeout(Duration::from_secs(3), connector.write_frame(&frame)).await;
    assert!(matches!(written, Ok(Ok(()))));

    assert_eq!(connector.read(16).await.unwrap(), b"QMOD\x49\xc1\r");
}

#[tokio::test]
async fn first_openable_device_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw1");

    let mut connector = connector_for(&["/nonexistent/hidraw7", path.as_str()], 0);
    connector.open().await.unwrap();

    assert!(connector.is_open());
    assert_eq!(connector.path(), Some(path.as_str()));
}

#[tokio::test]
async fn no_device_lists_candidates() {
    let mut connector = connector_for(&["/nonexistent/hidraw0", "/nonexistent/hidraw1"], 0);

    match connector.open().await {
        Err(ConnectorError::NoDevice { devices }) => {
            assert_eq!(devices, vec!["/nonexistent/hidraw0", "/nonexistent/hidraw1"]);
        }
        other => panic!("expected NoDevice, got {:?}", other.map(|_| ())),
    }
    assert!(!connector.is_open());
}

#[tokio::test]
async fn closing_twice_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw0");

    let mut connector = connector_for(&[path.as_str()], 0);
    connector.open().await.unwrap();
    connector.close().await.unwrap();
    connector.close().await.unwrap();

    assert!(!connector.is_open());
    assert_eq!(connector.path(), None);
}

#[tokio::test]
async fn read_on_closed_device_loses_the_connection() {
    let mut connector = connector_for(&["/nonexistent/hidraw0"], 0);

    let err = connector.read(5).await.unwrap_err();

    assert!(matches!(
        err,
        ConnectorError::ConnectionLost { attempts: 0, .. }
    ));
}

#[tokio::test]
async fn closed_device_is_reopened_by_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw0");

    let mut connector = connector_for(&[path.as_str()], 2);
    connector.open().await.unwrap();
    connector.close().await.unwrap();

    assert!(connector.read(5).await.unwrap().is_empty());
    assert!(connector.is_open());
    assert_eq!(connector.open_attempts(), 2);
}

#[tokio::test]
async fn vanished_device_gives_up_after_max_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = fifo(&dir, "hidraw0");

    let mut connector = connector_for(&[path.as_str()], 2);
    connector.open().await.unwrap();
    connector.close().await.unwrap();
    std::fs::remove_file(&path).unwrap();

    match connector.read(5).await {
        Err(ConnectorError::ConnectionLost { attempts, source }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(*source, ConnectorError::NotOpen));
        }
        other => panic!("expected ConnectionLost, got {:?}", other),
    }

    // the first open plus one reopen per retry
    assert_eq!(connector.open_attempts(), 3);
    assert!(!connector.is_open());
}

#[tokio::test]
async fn regular_file_is_not_a_device() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_string_lossy().to_string();

    let mut connector = connector_for(&[path.as_str()], 0);

    assert!(matches!(
        connector.open().await,
        Err(ConnectorError::NoDevice { .. })
    ));
}
