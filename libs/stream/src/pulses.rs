use serde::{Deserialize, Serialize};

use pulse_api::{Pulse, now_secs};

use crate::aggregator::Aggregation;
use crate::error::StreamError;

// ═══════════════════════════════════════════════════════════════
//  Topic routing
// ═══════════════════════════════════════════════════════════════

/// Per-tenant topic обогащённых записей.
pub fn grouped_topic(tenant: &str) -> String {
    format!("tenants.{tenant}.grouped.pulses")
}

/// Per-tenant topic оконных агрегатов.
pub fn aggregate_topic(tenant: &str) -> String {
    format!("tenants.{tenant}.aggregated.pulses.amount")
}

// ═══════════════════════════════════════════════════════════════
//  Output records
// ═══════════════════════════════════════════════════════════════

/// Обогащённая запись одного pulse'а на `tenants.<tenant>.grouped.pulses`.
/// Downstream-имена полей исправлены (`used_amount`, `use_unit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupedRecord {
    pub object_id: String,
    pub tenant_id: String,
    pub product_sku: String,
    pub use_unit: String,
    pub used_amount: f64,
    pub timestamp: i64,
}

impl GroupedRecord {
    /// Новый object_id на каждый вызов: grouped-записи не дедуплицируются.
    pub fn from_pulse(pulse: &Pulse) -> Self {
        Self {
            object_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: pulse.tenant_id.clone(),
            product_sku: pulse.product_sku.clone(),
            use_unit: pulse.use_unity.clone(),
            used_amount: pulse.used_ammount,
            timestamp: now_secs(),
        }
    }
}

/// Оконная сумма по ключу (tenant, SKU, unit) на
/// `tenants.<tenant>.aggregated.pulses.amount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub tenant_id: String,
    pub product_sku: String,
    pub use_unit: String,
    pub total_amount: f64,
    pub window: String,
    pub timestamp: i64,
}

// ═══════════════════════════════════════════════════════════════
//  PulseAggregation — operation bundle for pulse events
// ═══════════════════════════════════════════════════════════════

/// Агрегация pulse'ов по ключу `<tenant>.<sku>.<unit>`.
pub struct PulseAggregation;

fn parse_key(key: &str) -> Result<(&str, &str, &str), StreamError> {
    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        [tenant, sku, unit] => Ok((tenant, sku, unit)),
        _ => Err(StreamError::BadKey(key.to_string())),
    }
}

impl Aggregation for PulseAggregation {
    type Event = Pulse;

    fn key(&self, pulse: &Pulse) -> String {
        format!(
            "{}.{}.{}",
            pulse.tenant_id, pulse.product_sku, pulse.use_unity
        )
    }

    fn amount(&self, pulse: &Pulse) -> f64 {
        pulse.used_ammount
    }

    fn render(
        &self,
        key: &str,
        window: &str,
        total: f64,
    ) -> Result<(serde_json::Value, String), StreamError> {
        let (tenant, sku, unit) = parse_key(key)?;
        let record = AggregateRecord {
            tenant_id: tenant.to_string(),
            product_sku: sku.to_string(),
            use_unit: unit.to_string(),
            total_amount: total,
            window: window.to_string(),
            timestamp: now_secs(),
        };
        let topic = aggregate_topic(tenant);
        Ok((serde_json::to_value(&record)?, topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_render_round_trip() {
        let agg = PulseAggregation;
        let (payload, topic) = agg.render("tenantX.skuY.unitZ", "10s", 30.5).unwrap();

        assert_eq!(topic, "tenants.tenantX.aggregated.pulses.amount");
        assert_eq!(payload["tenant_id"], "tenantX");
        assert_eq!(payload["product_sku"], "skuY");
        assert_eq!(payload["use_unit"], "unitZ");
        assert_eq!(payload["total_amount"].as_f64().unwrap(), 30.5);
        assert_eq!(payload["window"], "10s");
        assert!(payload["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn key_without_two_separators_is_rejected() {
        let agg = PulseAggregation;
        assert!(matches!(
            agg.render("tenant-only", "10s", 1.0),
            Err(StreamError::BadKey(_))
        ));
        assert!(matches!(
            agg.render("a.b.c.d", "10s", 1.0),
            Err(StreamError::BadKey(_))
        ));
    }

    #[test]
    fn key_matches_render_expectations() {
        let agg = PulseAggregation;
        let pulse = Pulse {
            tenant_id: "t1".to_string(),
            product_sku: "s1".to_string(),
            used_ammount: 2.5,
            use_unity: "GB".to_string(),
        };
        assert_eq!(agg.key(&pulse), "t1.s1.GB");
        assert_eq!(agg.amount(&pulse), 2.5);
    }

    #[test]
    fn grouped_record_carries_fresh_object_id() {
        let pulse = Pulse {
            tenant_id: "t".to_string(),
            product_sku: "s".to_string(),
            used_ammount: 1.0,
            use_unity: "u".to_string(),
        };
        let a = GroupedRecord::from_pulse(&pulse);
        let b = GroupedRecord::from_pulse(&pulse);
        assert!(!a.object_id.is_empty());
        assert_ne!(a.object_id, b.object_id);
        assert_eq!(a.use_unit, "u");
        assert_eq!(a.used_amount, 1.0);
    }

    #[test]
    fn topic_shapes() {
        assert_eq!(grouped_topic("T"), "tenants.T.grouped.pulses");
        assert_eq!(aggregate_topic("T"), "tenants.T.aggregated.pulses.amount");
    }
}
