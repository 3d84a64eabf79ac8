//! Per-operation timeouts
//!
//! Each resource type declares defaults; a configuration may override them
//! through a `timeouts` map such as `{"create": "30m", "delete": "1h30m"}`.

use std::collections::HashMap;
use std::time::Duration;

use crate::resource::Value;

/// Operation timeouts for a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(20 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(20 * 60),
            delete: Duration::from_secs(20 * 60),
        }
    }
}

impl Timeouts {
    /// Attribute name carrying user overrides
    pub const ATTRIBUTE: &'static str = "timeouts";

    pub fn with_create(mut self, d: Duration) -> Self {
        self.create = d;
        self
    }

    pub fn with_update(mut self, d: Duration) -> Self {
        self.update = d;
        self
    }

    pub fn with_delete(mut self, d: Duration) -> Self {
        self.delete = d;
        self
    }

    /// Parse the `timeouts` attribute value into (operation, duration) pairs
    pub fn parse_overrides(value: &Value) -> Result<HashMap<String, Duration>, String> {
        let map = value
            .as_map()
            .ok_or_else(|| "timeouts must be a map".to_string())?;
        let mut out = HashMap::new();
        for (op, v) in map {
            if !matches!(op.as_str(), "create" | "read" | "update" | "delete") {
                return Err(format!("unknown timeout operation '{}'", op));
            }
            let raw = v
                .as_str()
                .ok_or_else(|| format!("timeout for '{}' must be a string", op))?;
            out.insert(op.clone(), parse_duration(raw)?);
        }
        Ok(out)
    }

    /// Apply overrides found in a resource's attributes, ignoring malformed ones
    /// (validation reports those before any call is made)
    pub fn resolve(self, attributes: &HashMap<String, Value>) -> Self {
        let Some(value) = attributes.get(Self::ATTRIBUTE) else {
            return self;
        };
        let Ok(overrides) = Self::parse_overrides(value) else {
            return self;
        };
        let mut t = self;
        for (op, d) in overrides {
            match op.as_str() {
                "create" => t.create = d,
                "read" => t.read = d,
                "update" => t.update = d,
                "delete" => t.delete = d,
                _ => {}
            }
        }
        t
    }
}

/// Parse durations like "45s", "10m", "2h", "1h30m"
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let mut total = 0u64;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{}'", s))?;
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(format!("invalid duration unit '{}' in '{}'", c, s)),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration '{}' is too large", s))?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(format!("missing unit in duration '{}'", s));
    }
    Ok(Duration::from_secs(total))
}
