//! Resource descriptor: CPU, memory and GPU limits/requests
//!
//! Quantities follow Kubernetes conventions. CPU is either a decimal core
//! count (`"0.5"`, `"2"`) or integer millicores (`"500m"`). Memory is a
//! number with an optional binary (`Ki`..`Ei`) or decimal (`k`..`E`) suffix.
//! Absent fields mean "unspecified", never zero.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CompilationError;
use crate::k8s::ResourceRequirements;

// =============================================================================
// Quantity
// =============================================================================

/// A resource quantity as written by the user (e.g., `"128Mi"`, `"500m"`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Quantity(String);

impl Quantity {
    /// Parse a CPU quantity
    pub fn cpu(raw: &str, field: &str) -> Result<Self, CompilationError> {
        parse_cpu_millis(raw)
            .map(|_| Self(raw.to_string()))
            .ok_or_else(|| {
                CompilationError::invalid_resource(
                    field,
                    format!("invalid cpu quantity '{raw}' (expected e.g., '100m', '1', '0.5')"),
                )
            })
    }

    /// Parse a memory quantity
    pub fn memory(raw: &str, field: &str) -> Result<Self, CompilationError> {
        parse_memory_bytes(raw)
            .map(|_| Self(raw.to_string()))
            .ok_or_else(|| {
                CompilationError::invalid_resource(
                    field,
                    format!("invalid memory quantity '{raw}' (expected e.g., '128Mi', '1Gi')"),
                )
            })
    }

    /// The quantity exactly as written
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// YAML authors write `cpu: 2` as often as `cpu: "2"`; accept both.
impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct QuantityVisitor;

        impl serde::de::Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a resource quantity string or number")
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Quantity, E> {
                Ok(Quantity(v.to_string()))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Quantity, E> {
                Ok(Quantity(v.to_string()))
            }

            // Negative values are kept so validation can report them with context.
            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity(v.to_string()))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Quantity, E> {
                Ok(Quantity(v.to_string()))
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// Parse an unsigned decimal: digits with at most one `.`
fn parse_decimal(s: &str) -> Option<f64> {
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in s.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    s.parse::<f64>().ok()
}

/// CPU quantity in millicores
pub fn parse_cpu_millis(qty: &str) -> Option<f64> {
    if let Some(stripped) = qty.strip_suffix('m') {
        // Millicores must be whole numbers
        if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        return stripped.parse::<f64>().ok();
    }
    parse_decimal(qty).map(|cores| cores * 1000.0)
}

/// Memory quantity in bytes
pub fn parse_memory_bytes(qty: &str) -> Option<f64> {
    // Two-letter binary suffixes are checked before their one-letter decimal prefixes
    const SUFFIXES: [(&str, f64); 12] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
        ("k", 1e3),
        ("M", 1e6),
        ("G", 1e9),
        ("T", 1e12),
        ("P", 1e15),
        ("E", 1e18),
    ];

    match SUFFIXES.iter().find(|(s, _)| qty.ends_with(s)) {
        Some((suffix, factor)) => {
            parse_decimal(&qty[..qty.len() - suffix.len()]).map(|n| n * factor)
        }
        None => parse_decimal(qty),
    }
}

// =============================================================================
// Resource Descriptor
// =============================================================================

/// Resource limits
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    /// CPU limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    /// Memory limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
    /// GPU count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpus: Option<u32>,
    /// GPU resource name (e.g., "nvidia.com/gpu")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
}

/// Resource requests
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequests {
    /// CPU request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    /// Memory request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
}

/// Limits and requests for a run's container
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Resource limits
    #[serde(default)]
    pub limits: ResourceLimits,
    /// Resource requests
    #[serde(default)]
    pub requests: ResourceRequests,
}

impl ResourceDescriptor {
    /// Merge limits into the descriptor.
    ///
    /// Only supplied fields are overwritten. All inputs are validated before
    /// anything is written, so a failed call leaves the descriptor untouched.
    pub fn set_limits(
        &mut self,
        mem: Option<&str>,
        cpu: Option<&str>,
        gpus: Option<u32>,
        gpu_type: Option<&str>,
    ) -> Result<(), CompilationError> {
        let gpu_type = gpu_type.filter(|t| !t.is_empty());
        if gpus.is_some() && gpu_type.is_none() {
            return Err(CompilationError::invalid_resource(
                "limits.gpus",
                "gpu_type is required when gpus is set",
            ));
        }
        let memory = mem
            .map(|m| Quantity::memory(m, "limits.memory"))
            .transpose()?;
        let cpu = cpu.map(|c| Quantity::cpu(c, "limits.cpu")).transpose()?;

        if let Some(memory) = memory {
            self.limits.memory = Some(memory);
        }
        if let Some(cpu) = cpu {
            self.limits.cpu = Some(cpu);
        }
        match (gpus, gpu_type) {
            (Some(count), Some(kind)) => {
                self.limits.gpus = Some(count);
                self.limits.gpu_type = Some(kind.to_string());
            }
            (None, Some(kind)) => {
                debug!(gpu_type = kind, "gpu_type without gpus ignored");
            }
            _ => {}
        }
        Ok(())
    }

    /// Merge requests into the descriptor (partial update, validated first)
    pub fn set_requests(
        &mut self,
        mem: Option<&str>,
        cpu: Option<&str>,
    ) -> Result<(), CompilationError> {
        let memory = mem
            .map(|m| Quantity::memory(m, "requests.memory"))
            .transpose()?;
        let cpu = cpu.map(|c| Quantity::cpu(c, "requests.cpu")).transpose()?;

        if let Some(memory) = memory {
            self.requests.memory = Some(memory);
        }
        if let Some(cpu) = cpu {
            self.requests.cpu = Some(cpu);
        }
        Ok(())
    }

    /// Validate the whole descriptor.
    ///
    /// Re-checks quantity syntax (descriptors may be deserialized), GPU
    /// pairing, and that requests do not exceed limits.
    pub fn validate(&self) -> Result<(), CompilationError> {
        if self.limits.gpus.is_some()
            && self.limits.gpu_type.as_deref().unwrap_or_default().is_empty()
        {
            return Err(CompilationError::invalid_resource(
                "limits.gpus",
                "gpu_type is required when gpus is set",
            ));
        }

        let limit_cpu = measure(self.limits.cpu.as_ref(), "limits.cpu", parse_cpu_millis)?;
        let limit_mem = measure(
            self.limits.memory.as_ref(),
            "limits.memory",
            parse_memory_bytes,
        )?;
        let request_cpu = measure(self.requests.cpu.as_ref(), "requests.cpu", parse_cpu_millis)?;
        let request_mem = measure(
            self.requests.memory.as_ref(),
            "requests.memory",
            parse_memory_bytes,
        )?;

        check_not_above(request_cpu, limit_cpu, &self.requests.cpu, &self.limits.cpu, "cpu")?;
        check_not_above(
            request_mem,
            limit_mem,
            &self.requests.memory,
            &self.limits.memory,
            "memory",
        )?;
        Ok(())
    }

    /// Render into Kubernetes resource requirements; `None` when nothing is set
    pub fn to_requirements(&self) -> Option<ResourceRequirements> {
        let mut limits = BTreeMap::new();
        if let Some(ref cpu) = self.limits.cpu {
            limits.insert("cpu".to_string(), cpu.to_string());
        }
        if let Some(ref memory) = self.limits.memory {
            limits.insert("memory".to_string(), memory.to_string());
        }
        if let (Some(count), Some(kind)) = (self.limits.gpus, self.limits.gpu_type.as_ref()) {
            limits.insert(kind.clone(), count.to_string());
        }

        let mut requests = BTreeMap::new();
        if let Some(ref cpu) = self.requests.cpu {
            requests.insert("cpu".to_string(), cpu.to_string());
        }
        if let Some(ref memory) = self.requests.memory {
            requests.insert("memory".to_string(), memory.to_string());
        }

        let reqs = ResourceRequirements { requests, limits };
        (!reqs.is_empty()).then_some(reqs)
    }
}

fn measure(
    qty: Option<&Quantity>,
    field: &str,
    parse: fn(&str) -> Option<f64>,
) -> Result<Option<f64>, CompilationError> {
    qty.map(|q| {
        parse(q.as_str()).ok_or_else(|| {
            CompilationError::invalid_resource(field, format!("invalid quantity '{q}'"))
        })
    })
    .transpose()
}

fn check_not_above(
    request: Option<f64>,
    limit: Option<f64>,
    request_raw: &Option<Quantity>,
    limit_raw: &Option<Quantity>,
    resource: &str,
) -> Result<(), CompilationError> {
    if let (Some(req), Some(lim), Some(req_raw), Some(lim_raw)) =
        (request, limit, request_raw, limit_raw)
    {
        if req > lim {
            return Err(CompilationError::invalid_resource(
                format!("requests.{resource}"),
                format!("request {req_raw} exceeds limit {lim_raw}"),
            ));
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_cpu_quantities() {
        assert_eq!(parse_cpu_millis("100m"), Some(100.0));
        assert_eq!(parse_cpu_millis("1"), Some(1000.0));
        assert_eq!(parse_cpu_millis("0.5"), Some(500.0));
        assert_eq!(parse_cpu_millis("2000m"), Some(2000.0));
    }

    #[test]
    fn test_invalid_cpu_quantities() {
        assert!(parse_cpu_millis("").is_none());
        assert!(parse_cpu_millis("abc").is_none());
        assert!(parse_cpu_millis("100x").is_none());
        assert!(parse_cpu_millis("1.5m").is_none());
        assert!(parse_cpu_millis("-1").is_none());
        assert!(parse_cpu_millis("m").is_none());
        assert!(parse_cpu_millis("inf").is_none());
    }

    #[test]
    fn test_valid_memory_quantities() {
        assert_eq!(parse_memory_bytes("128Mi"), Some(134_217_728.0));
        assert_eq!(parse_memory_bytes("1Gi"), Some(1_073_741_824.0));
        assert_eq!(parse_memory_bytes("1000000"), Some(1_000_000.0));
        assert_eq!(parse_memory_bytes("512Ki"), Some(524_288.0));
        assert_eq!(parse_memory_bytes("1M"), Some(1_000_000.0));
        assert_eq!(parse_memory_bytes("1.5G"), Some(1_500_000_000.0));
    }

    #[test]
    fn test_invalid_memory_quantities() {
        assert!(parse_memory_bytes("").is_none());
        assert!(parse_memory_bytes("abc").is_none());
        assert!(parse_memory_bytes("128Xi").is_none());
        assert!(parse_memory_bytes("Gi").is_none());
        assert!(parse_memory_bytes("-2Gi").is_none());
    }

    #[test]
    fn gpus_without_type_fails() {
        let mut res = ResourceDescriptor::default();
        let err = res
            .set_limits(Some("4Gi"), Some("2"), Some(1), None)
            .unwrap_err();
        assert!(matches!(err, CompilationError::InvalidResourceSpec { .. }));
        assert_eq!(err.field(), Some("limits.gpus"));
        // Nothing was written
        assert_eq!(res, ResourceDescriptor::default());
    }

    #[test]
    fn empty_gpu_type_counts_as_missing() {
        let mut res = ResourceDescriptor::default();
        assert!(res.set_limits(None, None, Some(2), Some("")).is_err());
    }

    #[test]
    fn invalid_quantity_leaves_descriptor_untouched() {
        let mut res = ResourceDescriptor::default();
        res.set_limits(Some("1Gi"), None, None, None).unwrap();

        let err = res.set_limits(Some("2Gi"), Some("lots"), None, None).unwrap_err();
        assert_eq!(err.field(), Some("limits.cpu"));
        assert_eq!(res.limits.memory.as_ref().map(Quantity::as_str), Some("1Gi"));
    }

    #[test]
    fn partial_updates_keep_other_fields() {
        let mut res = ResourceDescriptor::default();
        res.set_limits(Some("4Gi"), Some("2"), Some(4), Some("nvidia.com/gpu"))
            .unwrap();
        res.set_limits(None, Some("3"), None, None).unwrap();

        assert_eq!(res.limits.memory.as_ref().map(Quantity::as_str), Some("4Gi"));
        assert_eq!(res.limits.cpu.as_ref().map(Quantity::as_str), Some("3"));
        assert_eq!(res.limits.gpus, Some(4));
        assert_eq!(res.limits.gpu_type.as_deref(), Some("nvidia.com/gpu"));
    }

    #[test]
    fn gpu_type_alone_is_ignored() {
        let mut res = ResourceDescriptor::default();
        res.set_limits(None, None, None, Some("nvidia.com/gpu")).unwrap();
        assert!(res.limits.gpu_type.is_none());
    }

    #[test]
    fn request_above_limit_fails_validation() {
        let mut res = ResourceDescriptor::default();
        res.set_limits(Some("1Gi"), Some("500m"), None, None).unwrap();
        res.set_requests(Some("512Mi"), Some("1")).unwrap();

        let err = res.validate().unwrap_err();
        assert_eq!(err.field(), Some("requests.cpu"));
    }

    #[test]
    fn requests_equal_to_limits_are_valid() {
        let mut res = ResourceDescriptor::default();
        res.set_limits(Some("2"), Some("4"), Some(4), Some("test/gpu"))
            .unwrap();
        res.set_requests(Some("2"), Some("3")).unwrap();
        res.validate().unwrap();
    }

    #[test]
    fn request_without_limit_is_valid() {
        let mut res = ResourceDescriptor::default();
        res.set_requests(Some("64Gi"), Some("32")).unwrap();
        res.validate().unwrap();
    }

    #[test]
    fn deserialized_descriptor_is_revalidated() {
        let yaml = "limits:\n  cpu: 2\n  memory: 1Gi\n  gpus: 1\n";
        let res: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(res.limits.cpu.as_ref().map(Quantity::as_str), Some("2"));
        assert_eq!(res.validate().unwrap_err().field(), Some("limits.gpus"));

        let yaml = "requests:\n  memory: -5\n";
        let res: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(res.validate().unwrap_err().field(), Some("requests.memory"));
    }

    #[test]
    fn renders_gpu_type_as_resource_key() {
        let mut res = ResourceDescriptor::default();
        res.set_limits(Some("2"), Some("4"), Some(4), Some("test/gpu"))
            .unwrap();
        res.set_requests(Some("2"), Some("3")).unwrap();

        let reqs = res.to_requirements().unwrap();
        assert_eq!(reqs.limits.get("memory").map(String::as_str), Some("2"));
        assert_eq!(reqs.limits.get("cpu").map(String::as_str), Some("4"));
        assert_eq!(reqs.limits.get("test/gpu").map(String::as_str), Some("4"));
        assert_eq!(reqs.requests.get("cpu").map(String::as_str), Some("3"));
        assert_eq!(reqs.requests.len(), 2);
    }

    #[test]
    fn unspecified_resources_render_nothing() {
        assert!(ResourceDescriptor::default().to_requirements().is_none());
    }
}
