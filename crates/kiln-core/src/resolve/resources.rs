//! Resource quantity validation.
//!
//! Quantities are parsed with integer arithmetic only: `<digits>[.<digits>][<unit>]` is turned
//! into a fraction and normalized to base units, which must come out whole.

use kiln_model::{ErrorCode, ResourceQuantities, ResourceSet, RunResources, RunResourcesSpec};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("invalid resource quantity for {field}: '{value}'")]
    InvalidResource { field: String, value: String },

    #[error("{kind} limit is below its request")]
    LimitBelowRequest { kind: &'static str },
}

impl ResourceError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::InvalidJobResources
    }
}

/// Kind of a schedulable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Normalized to millicores.
    Cpu,
    /// Normalized to bytes.
    Memory,
    NvidiaGpu,
    AmdGpu,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Cpu,
        ResourceKind::Memory,
        ResourceKind::NvidiaGpu,
        ResourceKind::AmdGpu,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::NvidiaGpu => "nvidiaGpu",
            ResourceKind::AmdGpu => "amdGpu",
        }
    }

    /// `(numerator, denominator)` converting one `unit` into base units.
    fn scale(&self, unit: &str) -> Option<(u128, u128)> {
        match (self, unit) {
            (ResourceKind::Cpu, "") => Some((1000, 1)),
            (ResourceKind::Cpu, "m") => Some((1, 1)),
            (ResourceKind::Memory, "") => Some((1, 1)),
            (ResourceKind::Memory, "m") => Some((1, 1000)),
            (ResourceKind::Memory, "Ki") => Some((1 << 10, 1)),
            (ResourceKind::Memory, "Mi") => Some((1 << 20, 1)),
            (ResourceKind::Memory, "Gi") => Some((1 << 30, 1)),
            (ResourceKind::Memory, "Ti") => Some((1 << 40, 1)),
            (ResourceKind::NvidiaGpu | ResourceKind::AmdGpu, "") => Some((1, 1)),
            _ => None,
        }
    }

    /// Parse a non-empty quantity into base units; `None` when malformed.
    pub fn parse(&self, raw: &str) -> Option<u64> {
        let split = raw
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(raw.len());
        let (number, unit) = raw.split_at(split);
        let (num, den) = self.scale(unit)?;

        let (whole, frac) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty()
            || (number.contains('.') && frac.is_empty())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        if matches!(self, ResourceKind::NvidiaGpu | ResourceKind::AmdGpu) && !frac.is_empty() {
            return None;
        }

        let mut mantissa: u128 = 0;
        for d in whole.bytes().chain(frac.bytes()) {
            mantissa = mantissa.checked_mul(10)?.checked_add(u128::from(d - b'0'))?;
        }
        let frac_scale = 10u128.checked_pow(u32::try_from(frac.len()).ok()?)?;

        let top = mantissa.checked_mul(num)?;
        let bottom = frac_scale.checked_mul(den)?;
        if top % bottom != 0 {
            return None;
        }
        u64::try_from(top / bottom).ok()
    }

    /// Canonical text form of a normalized value; re-parses to the same value.
    pub fn canonical(&self, value: u64) -> String {
        match self {
            ResourceKind::Cpu => format!("{value}m"),
            _ => value.to_string(),
        }
    }

    fn raw<'a>(&self, q: &'a ResourceQuantities) -> Option<&'a str> {
        let v = match self {
            ResourceKind::Cpu => q.cpu.as_deref(),
            ResourceKind::Memory => q.memory.as_deref(),
            ResourceKind::NvidiaGpu => q.nvidia_gpu.as_deref(),
            ResourceKind::AmdGpu => q.amd_gpu.as_deref(),
        };
        v.map(str::trim).filter(|s| !s.is_empty())
    }

    fn slot<'a>(&self, set: &'a mut ResourceSet) -> &'a mut Option<u64> {
        match self {
            ResourceKind::Cpu => &mut set.cpu_millis,
            ResourceKind::Memory => &mut set.memory_bytes,
            ResourceKind::NvidiaGpu => &mut set.nvidia_gpu,
            ResourceKind::AmdGpu => &mut set.amd_gpu,
        }
    }

    pub fn get(&self, set: &ResourceSet) -> Option<u64> {
        match self {
            ResourceKind::Cpu => set.cpu_millis,
            ResourceKind::Memory => set.memory_bytes,
            ResourceKind::NvidiaGpu => set.nvidia_gpu,
            ResourceKind::AmdGpu => set.amd_gpu,
        }
    }
}

fn normalize(side: &str, q: &ResourceQuantities) -> Result<ResourceSet, ResourceError> {
    let mut out = ResourceSet::default();
    for kind in ResourceKind::ALL {
        if let Some(raw) = kind.raw(q) {
            let value = kind.parse(raw).ok_or_else(|| ResourceError::InvalidResource {
                field: format!("{side}.{}", kind.as_str()),
                value: raw.to_string(),
            })?;
            *kind.slot(&mut out) = Some(value);
        }
    }
    Ok(out)
}

/// Validate and normalize requests and limits.
pub fn validate_resources(spec: &RunResourcesSpec) -> Result<RunResources, ResourceError> {
    let requests = normalize("requests", &spec.requests)?;
    let limits = normalize("limits", &spec.limits)?;

    for kind in ResourceKind::ALL {
        if let (Some(req), Some(lim)) = (kind.get(&requests), kind.get(&limits)) {
            if lim < req {
                return Err(ResourceError::LimitBelowRequest {
                    kind: kind.as_str(),
                });
            }
        }
    }

    Ok(RunResources { requests, limits })
}
