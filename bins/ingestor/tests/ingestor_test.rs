//! End-to-end тесты ingestor'а: реальный broker на loopback-порту,
//! реальные connector'ы, полный путь pulse → grouped / aggregated.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use fsbroker::{Broker, SinkConnector, SourceConnector};
use pulse_api::{FrameHandler, Pulse};
use pulse_stream::Options;

struct Capture {
    tx: mpsc::Sender<Vec<u8>>,
}

impl FrameHandler for Capture {
    fn on_frame(
        &self,
        _topic: &str,
        frame: &[u8],
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let frame = frame.to_vec();
        Box::pin(async move {
            let _ = self.tx.send(frame).await;
        })
    }
}

fn subscribe(host: &str, topic: &str) -> mpsc::Receiver<Vec<u8>> {
    let source = Arc::new(SourceConnector::new(host));
    let (tx, rx) = mpsc::channel(16);
    let topic = topic.to_string();
    tokio::spawn(async move {
        let _ = source.read(&topic, Arc::new(Capture { tx })).await;
    });
    rx
}

async fn publish(host: &str, topic: &str, pulses: &[Pulse]) {
    let producer = SinkConnector::new(host);
    producer.connect(topic).await.expect("producer connect");
    for pulse in pulses {
        let msg = serde_json::to_vec(pulse).unwrap();
        producer.write(topic, &msg).await.expect("producer write");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn pulse(tenant: &str, sku: &str, amount: f64, unit: &str) -> Pulse {
    Pulse {
        tenant_id: tenant.to_string(),
        product_sku: sku.to_string(),
        used_ammount: amount,
        use_unity: unit.to_string(),
    }
}

#[tokio::test]
async fn ingestor_groups_pulses_per_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let mut broker = Broker::new(19921, dir.path());
    broker.start().await.expect("broker start");
    let host = broker.host().to_string();

    let tenant = Uuid::new_v4().to_string();
    let sku = Uuid::new_v4().to_string();
    let source_topic = format!("test.{}.source.pulses", Uuid::new_v4());

    let source = Arc::new(SourceConnector::new(&host));
    let sink = Arc::new(SinkConnector::new(&host));
    let opts = Options::new(source_topic.clone(), source.clone(), sink);
    tokio::spawn(pulse_stream::start(opts));

    let grouped_topic = format!("tenants.{tenant}.grouped.pulses");
    let mut rx = subscribe(&host, &grouped_topic);
    tokio::time::sleep(Duration::from_millis(300)).await;

    publish(
        &host,
        &source_topic,
        &[
            pulse(&tenant, &sku, 10.5, "kWh"),
            pulse(&tenant, &sku, 20.0, "kWh"),
            pulse(&tenant, &sku, 20.0, "kWh"),
        ],
    )
    .await;

    let mut records = Vec::new();
    while records.len() < 3 {
        let frame = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timeout waiting for grouped records")
            .expect("grouped stream closed");
        records.push(frame);
    }

    for frame in &records {
        let record: serde_json::Value = serde_json::from_slice(frame).unwrap();
        assert_eq!(record["tenant_id"], tenant.as_str());
        assert_eq!(record["product_sku"], sku.as_str());
        assert_eq!(record["use_unit"], "kWh");
        assert!(!record["object_id"].as_str().unwrap().is_empty());
    }

    source.close();
    broker.stop();
}

#[tokio::test]
async fn ingestor_emits_windowed_aggregate() {
    let dir = tempfile::tempdir().unwrap();
    let mut broker = Broker::new(19922, dir.path());
    broker.start().await.expect("broker start");
    let host = broker.host().to_string();

    let tenant = Uuid::new_v4().to_string();
    let sku = Uuid::new_v4().to_string();
    let source_topic = format!("test.{}.source.pulses", Uuid::new_v4());

    // публикуем до старта pipeline'а: replay доставит оба pulse'а в
    // первое окно агрегации
    publish(
        &host,
        &source_topic,
        &[
            pulse(&tenant, &sku, 10.5, "kWh"),
            pulse(&tenant, &sku, 20.0, "kWh"),
        ],
    )
    .await;

    let source = Arc::new(SourceConnector::new(&host));
    let sink = Arc::new(SinkConnector::new(&host));
    let mut opts = Options::new(source_topic.clone(), source.clone(), sink);
    opts.flush_every = Duration::from_secs(2);
    tokio::spawn(pulse_stream::start(opts));

    let aggregate_topic = format!("tenants.{tenant}.aggregated.pulses.amount");
    let mut rx = subscribe(&host, &aggregate_topic);

    let frame = timeout(Duration::from_secs(8), rx.recv())
        .await
        .expect("timeout waiting for aggregate record")
        .expect("aggregate stream closed");

    let record: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(record["tenant_id"], tenant.as_str());
    assert_eq!(record["product_sku"], sku.as_str());
    assert_eq!(record["use_unit"], "kWh");
    assert_eq!(record["total_amount"].as_f64().unwrap(), 30.5);
    assert_eq!(record["window"], "2s");

    source.close();
    broker.stop();
}
