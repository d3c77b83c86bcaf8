use serde::{Deserialize, Serialize};

/// Событие использования (pulse): tenant + SKU + объём + единица измерения.
///
/// Имена полей `used_ammount` / `use_unity` — исторические, сохраняются
/// для wire-совместимости. Исправленные имена (`used_amount`, `use_unit`)
/// используются только в производных записях downstream-топиков.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pulse {
    pub tenant_id: String,
    pub product_sku: String,
    pub used_ammount: f64,
    pub use_unity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_round_trip() {
        let pulse = Pulse {
            tenant_id: "tenant-1".to_string(),
            product_sku: "sku-9".to_string(),
            used_ammount: 42.5,
            use_unity: "GB".to_string(),
        };

        let json = serde_json::to_string(&pulse).unwrap();
        let back: Pulse = serde_json::from_str(&json).unwrap();
        assert_eq!(pulse, back);
    }

    #[test]
    fn wire_field_names_preserved() {
        let pulse = Pulse {
            tenant_id: "t".to_string(),
            product_sku: "s".to_string(),
            used_ammount: 1.0,
            use_unity: "kWh".to_string(),
        };

        let json = serde_json::to_string(&pulse).unwrap();
        assert!(json.contains("\"used_ammount\""));
        assert!(json.contains("\"use_unity\""));
    }

    #[test]
    fn parses_external_payload() {
        let raw = r#"{"tenant_id":"T","product_sku":"S","used_ammount":42.0,"use_unity":"GB"}"#;
        let pulse: Pulse = serde_json::from_str(raw).unwrap();
        assert_eq!(pulse.tenant_id, "T");
        assert_eq!(pulse.used_ammount, 42.0);
    }
}
