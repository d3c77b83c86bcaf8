use std::time::Duration;

use fsbroker::SinkConnector;
use pulse_api::{ConnectorError, Pulse};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════
//  Stub pulse generator
// ═══════════════════════════════════════════════════════════════

/// Удалить data-директорию со всеми topic-файлами.
pub fn clean_topics(data_dir: &str) {
    match std::fs::remove_dir_all(data_dir) {
        Ok(()) => tracing::info!(dir = %data_dir, "topic data cleaned"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = %data_dir, error = %e, "cannot clean topic data"),
    }
}

struct StubSku {
    id: String,
    unit: String,
}

/// Публиковать случайный pulse каждые 100 мс в source topic.
///
/// Пулы tenant'ов и SKU генерируются один раз при старте; unit берётся
/// из `unit_0`..`unit_9`. Не возвращается до ошибки соединения.
pub async fn write_random_pulses(
    host: &str,
    source_topic: &str,
    tenants: usize,
    skus: usize,
) -> Result<(), ConnectorError> {
    let sink = SinkConnector::new(host);
    sink.connect(source_topic).await?;

    let mut rng = Rng::new();
    let tenants: Vec<String> = (0..tenants.max(1))
        .map(|_| Uuid::new_v4().to_string())
        .collect();
    let skus: Vec<StubSku> = (0..skus.max(1))
        .map(|_| StubSku {
            id: Uuid::new_v4().to_string(),
            unit: format!("unit_{}", rng.next_intn(10)),
        })
        .collect();

    tracing::info!(topic = %source_topic, "stub generator started");

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    loop {
        ticker.tick().await;

        let tenant = &tenants[rng.next_intn(tenants.len())];
        let sku = &skus[rng.next_intn(skus.len())];
        let pulse = Pulse {
            tenant_id: tenant.clone(),
            product_sku: sku.id.clone(),
            used_ammount: rng.next_f64() * 100.0,
            use_unity: sku.unit.clone(),
        };

        let msg = match serde_json::to_vec(&pulse) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "cannot serialize stub pulse");
                continue;
            }
        };
        // connect освежает кешированную сессию (дедлайн 5 минут)
        if let Err(e) = sink.connect(source_topic).await {
            tracing::warn!(error = %e, "stub connect error");
            continue;
        }
        if let Err(e) = sink.write(source_topic, &msg).await {
            tracing::warn!(error = %e, "stub write error");
            continue;
        }
        tracing::debug!(tenant = %pulse.tenant_id, sku = %pulse.product_sku, "stub pulse published");
    }
}

// ═══════════════════════════════════════════════════════════════
//  RNG (xorshift64)
// ═══════════════════════════════════════════════════════════════

struct Rng {
    state: u64,
}

impl Rng {
    fn new() -> Self {
        let state = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
            | 1; // ensure non-zero
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Returns f64 in [0, 1)
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / ((1u64 << 53) as f64)
    }

    fn next_intn(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
