//! Schema - Define type schemas for resources
//!
//! Every resource type and data source carries a schema. The host validates a
//! configuration against it before any API call is made, and the provider uses
//! `provider_name` to map attributes onto wire properties.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::resource::Value;
use crate::timeouts::Timeouts;

/// Validation function used by custom attribute types
pub type ValidateFn = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Attribute type
#[derive(Clone)]
pub enum AttributeType {
    String,
    Int,
    Float,
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: ValidateFn,
    },
    List(Box<AttributeType>),
    /// Unordered collection without duplicates
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    /// Nested object with its own attributes
    Block(Vec<AttributeSchema>),
}

/// Resolve an enum value written as `variant`, `Type.variant` or
/// `ns.Type.variant` to the variant it names.
///
/// A value that is itself a variant wins, so variants containing dots (such as
/// `ipsec.1`) are kept whole. Otherwise the shortest prefix leaving a known
/// variant is stripped. Values naming no variant come back unchanged.
pub fn enum_variant<'a>(s: &'a str, variants: &[String]) -> &'a str {
    if variants.iter().any(|v| v == s) {
        return s;
    }
    s.match_indices('.')
        .map(|(i, _)| &s[i + 1..])
        .find(|rest| variants.iter().any(|v| v == rest))
        .unwrap_or(s)
}

impl fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve to strings at apply time
            (AttributeType::String, Value::String(_) | Value::ResourceRef(_, _)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                let variant = enum_variant(s, variants);
                if variants.iter().any(|v| v == variant) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { base, .. }, Value::ResourceRef(_, _))
                if matches!(**base, AttributeType::String) =>
            {
                Ok(())
            }
            (AttributeType::Custom { validate, .. }, v) => {
                validate(v).map_err(|message| TypeError::ValidationFailed { message })
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                    if items[..i].contains(item) {
                        return Err(TypeError::DuplicateSetElement { index: i });
                    }
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(fields), Value::Map(map)) => {
                for field in fields {
                    if field.required && !map.contains_key(&field.name) {
                        return Err(TypeError::MissingRequired {
                            name: field.name.clone(),
                        });
                    }
                }
                for (k, v) in map {
                    let field = fields.iter().find(|f| &f.name == k).ok_or_else(|| {
                        TypeError::UnknownAttribute { name: k.clone() }
                    })?;
                    field
                        .attr_type
                        .validate(v)
                        .map_err(|e| TypeError::InvalidAttribute {
                            name: k.clone(),
                            inner: Box::new(e),
                        })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedNotSettable { name: String },

    #[error("Attribute '{name}': {inner}")]
    InvalidAttribute { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Duplicate set element at index {index}")]
    DuplicateSetElement { index: usize },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Value is filled in by the cloud
    pub computed: bool,
    /// Changing this attribute replaces the resource
    pub force_new: bool,
    /// Value is never printed
    pub sensitive: bool,
    /// Value may be set in configuration even though it is computed
    pub optional: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    /// Wire property name (e.g., "VpcId" for Cloud Control)
    pub provider_name: Option<String>,
    /// Setting the cloud accepts but never reports back
    pub write_only: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            force_new: false,
            sensitive: false,
            optional: true,
            default: None,
            description: None,
            provider_name: None,
            write_only: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Read-only attribute reported by the cloud
    pub fn computed(mut self) -> Self {
        self.computed = true;
        self.optional = false;
        self
    }

    /// Optional attribute whose value the cloud picks when unset
    pub fn optional_computed(mut self) -> Self {
        self.computed = true;
        self.optional = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Reads never return this attribute; state keeps the last applied value
    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = Some(name.into());
        self
    }

    /// True if the attribute can only be read, never configured
    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub timeouts: Timeouts,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            timeouts: Timeouts::default(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Names of attributes whose change forces replacement
    pub fn force_new_attributes(&self) -> HashSet<&str> {
        self.attributes
            .values()
            .filter(|a| a.force_new)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        for (name, value) in attributes {
            // Internal keys are host bookkeeping
            if name.starts_with('_') {
                continue;
            }
            if name == Timeouts::ATTRIBUTE {
                if let Err(message) = Timeouts::parse_overrides(value) {
                    errors.push(TypeError::InvalidAttribute {
                        name: name.clone(),
                        inner: Box::new(TypeError::ValidationFailed { message }),
                    });
                }
                continue;
            }
            match self.attributes.get(name) {
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
                Some(schema) if schema.is_computed_only() => {
                    errors.push(TypeError::ComputedNotSettable { name: name.clone() })
                }
                Some(schema) => {
                    if let Err(e) = schema.attr_type.validate(value) {
                        errors.push(TypeError::InvalidAttribute {
                            name: name.clone(),
                            inner: Box::new(e),
                        });
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Copy write-only attribute values from `from` into `into`
    pub fn carry_write_only(&self, from: &HashMap<String, Value>, into: &mut HashMap<String, Value>) {
        for (name, attr) in &self.attributes {
            if attr.write_only
                && let Some(value) = from.get(name)
            {
                into.insert(name.clone(), value.clone());
            }
        }
    }

    /// Fill in defaults for attributes absent from the configuration
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            if let Some(default) = &schema.default
                && !attributes.contains_key(name)
            {
                attributes.insert(name.clone(), default.clone());
            }
        }
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;
    use regex::Regex;

    fn custom(
        name: &str,
        base: AttributeType,
        validate: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> AttributeType {
        AttributeType::Custom {
            name: name.to_string(),
            base: Box::new(base),
            validate: Arc::new(validate),
        }
    }

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        int_between(1, i64::MAX)
    }

    /// Integer within an inclusive range
    pub fn int_between(min: i64, max: i64) -> AttributeType {
        custom("IntBetween", AttributeType::Int, move |value| match value {
            Value::Int(n) if (min..=max).contains(n) => Ok(()),
            Value::Int(n) => Err(format!("{} is not in range {}..={}", n, min, max)),
            _ => Err("Expected integer".to_string()),
        })
    }

    /// Integer that must be one of a fixed set
    pub fn int_in_slice(allowed: &'static [i64]) -> AttributeType {
        custom("IntInSlice", AttributeType::Int, move |value| match value {
            Value::Int(n) if allowed.contains(n) => Ok(()),
            Value::Int(n) => Err(format!("{} is not one of {:?}", n, allowed)),
            _ => Err("Expected integer".to_string()),
        })
    }

    /// String whose length is within an inclusive range
    pub fn string_len_between(min: usize, max: usize) -> AttributeType {
        custom("StringLen", AttributeType::String, move |value| match value {
            Value::String(s) if (min..=max).contains(&s.chars().count()) => Ok(()),
            Value::String(s) => Err(format!(
                "length of '{}' must be between {} and {}, got {}",
                s,
                min,
                max,
                s.chars().count()
            )),
            _ => Err("Expected string".to_string()),
        })
    }

    /// String matching a regular expression
    pub fn string_matches(name: &str, pattern: &str, message: &str) -> AttributeType {
        let re = Regex::new(pattern);
        let message = message.to_string();
        custom(name, AttributeType::String, move |value| {
            let re = re
                .as_ref()
                .map_err(|e| format!("invalid validation pattern: {}", e))?;
            match value {
                Value::String(s) if re.is_match(s) => Ok(()),
                Value::String(s) => Err(format!("'{}': {}", s, message)),
                _ => Err("Expected string".to_string()),
            }
        })
    }

    /// ARN string
    pub fn arn() -> AttributeType {
        custom("Arn", AttributeType::String, |value| match value {
            Value::String(s) => crate::arn::Arn::parse(s).map(|_| ()).map_err(|e| e.to_string()),
            _ => Err("Expected string".to_string()),
        })
    }

    /// CIDR block type (e.g., "10.0.0.0/16")
    pub fn cidr() -> AttributeType {
        custom("Cidr", AttributeType::String, |value| match value {
            Value::String(s) => validate_cidr(s),
            _ => Err("Expected string".to_string()),
        })
    }

    /// TCP/UDP port, -1 meaning "all" for ICMP style rules
    pub fn port() -> AttributeType {
        custom("Port", AttributeType::Int, |value| match value {
            Value::Int(n) if (-1..=65535).contains(n) => Ok(()),
            Value::Int(_) => Err("Port number must be between -1 and 65535".to_string()),
            _ => Err("Expected integer".to_string()),
        })
    }

    /// Name of the [`json_document`] type
    pub const JSON_DOCUMENT: &str = "JsonDocument";

    /// JSON document (policy, redrive configuration) held as a string
    pub fn json_document() -> AttributeType {
        custom(JSON_DOCUMENT, AttributeType::String, |value| match value {
            Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|_| ())
                .map_err(|e| format!("invalid JSON document: {}", e)),
            _ => Err("Expected string".to_string()),
        })
    }

    /// Tags map: string keys to string values
    pub fn tags() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let (ip, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("Invalid CIDR format '{}': expected IP/prefix", cidr))?;

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() != 4 {
        return Err(format!("Invalid IP address '{}': expected 4 octets", ip));
    }
    for octet in &octets {
        if octet.parse::<u8>().is_err() {
            return Err(format!(
                "Invalid octet '{}' in IP address: must be 0-255",
                octet
            ));
        }
    }

    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-32", p)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&s("hello")).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(t.validate(&s("a")).is_ok());
        assert!(t.validate(&s("Type.a")).is_ok());
        assert!(t.validate(&s("c")).is_err());
    }

    #[test]
    fn enum_variants_may_contain_dots() {
        let variants = vec!["ipsec.1".to_string(), "gp3".to_string()];
        assert_eq!(enum_variant("ipsec.1", &variants), "ipsec.1");
        assert_eq!(enum_variant("Type.ipsec.1", &variants), "ipsec.1");
        assert_eq!(enum_variant("aws.Type.gp3", &variants), "gp3");
        assert_eq!(enum_variant("other.2", &variants), "other.2");

        let t = AttributeType::Enum(variants);
        assert!(t.validate(&s("ipsec.1")).is_ok());
        assert!(t.validate(&s("Type.ipsec.1")).is_ok());
        assert!(t.validate(&s("1")).is_err());
    }

    #[test]
    fn validate_int_between() {
        let t = types::int_between(1, 10);
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(10)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(11)).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(100)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_string_len_counts_characters() {
        let t = types::string_len_between(3, 5);
        assert!(t.validate(&s("abc")).is_ok());
        assert!(t.validate(&s("ab")).is_err());
        assert!(t.validate(&s("abcdef")).is_err());
    }

    #[test]
    fn validate_string_matches() {
        let t = types::string_matches("Lower", "^[a-z]+$", "only lowercase letters allowed");
        assert!(t.validate(&s("abc")).is_ok());
        let err = t.validate(&s("ABC")).unwrap_err();
        assert!(err.to_string().contains("only lowercase"));
    }

    #[test]
    fn invalid_pattern_fails_validation_instead_of_panicking() {
        let t = types::string_matches("Broken", "([", "unused");
        let err = t.validate(&s("x")).unwrap_err();
        assert!(err.to_string().contains("invalid validation pattern"));
    }

    #[test]
    fn resource_ref_passes_string_based_custom_types() {
        let t = types::cidr();
        let r = Value::ResourceRef("vpc".to_string(), "cidr_block".to_string());
        assert!(t.validate(&r).is_ok());
        assert!(types::port().validate(&r).is_err());
    }

    #[test]
    fn set_rejects_duplicates() {
        let t = AttributeType::Set(Box::new(AttributeType::String));
        assert!(t.validate(&Value::List(vec![s("a"), s("b")])).is_ok());
        assert_eq!(
            t.validate(&Value::List(vec![s("a"), s("a")])),
            Err(TypeError::DuplicateSetElement { index: 1 })
        );
    }

    #[test]
    fn block_checks_nested_fields() {
        let t = AttributeType::Block(vec![
            AttributeSchema::new("status", AttributeType::Enum(vec!["Enabled".to_string()]))
                .required(),
        ]);
        let mut ok = HashMap::new();
        ok.insert("status".to_string(), s("Enabled"));
        assert!(t.validate(&Value::Map(ok)).is_ok());

        assert!(matches!(
            t.validate(&Value::Map(HashMap::new())),
            Err(TypeError::MissingRequired { .. })
        ));

        let mut unknown = HashMap::new();
        unknown.insert("status".to_string(), s("Enabled"));
        unknown.insert("extra".to_string(), s("x"));
        assert!(matches!(
            t.validate(&Value::Map(unknown)),
            Err(TypeError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", types::positive_int()))
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool));

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), s("my-resource"));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let errors = schema.validate(&HashMap::new()).unwrap_err();
        assert_eq!(
            errors,
            vec![TypeError::MissingRequired {
                name: "name".to_string()
            }]
        );
    }

    #[test]
    fn computed_attribute_cannot_be_configured() {
        let schema = ResourceSchema::new("vpc")
            .attribute(AttributeSchema::new("vpc_id", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("instance_tenancy", AttributeType::String)
                    .optional_computed(),
            );

        let mut attrs = HashMap::new();
        attrs.insert("instance_tenancy".to_string(), s("default"));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("vpc_id".to_string(), s("vpc-123"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::ComputedNotSettable { .. }));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let schema = ResourceSchema::new("vpc");
        let mut attrs = HashMap::new();
        attrs.insert("bogus".to_string(), s("x"));
        attrs.insert("_module".to_string(), s("ignored"));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn malformed_timeouts_are_reported() {
        let schema = ResourceSchema::new("vpc");
        let mut timeouts = HashMap::new();
        timeouts.insert("create".to_string(), s("soon"));
        let mut attrs = HashMap::new();
        attrs.insert("timeouts".to_string(), Value::Map(timeouts));
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn apply_defaults_fills_only_missing() {
        let schema = ResourceSchema::new("bucket")
            .attribute(
                AttributeSchema::new("force_destroy", AttributeType::Bool)
                    .with_default(Value::Bool(false)),
            )
            .attribute(
                AttributeSchema::new("acl", AttributeType::String)
                    .with_default(s("private")),
            );

        let mut attrs = HashMap::new();
        attrs.insert("acl".to_string(), s("public-read"));
        schema.apply_defaults(&mut attrs);

        assert_eq!(attrs.get("force_destroy"), Some(&Value::Bool(false)));
        assert_eq!(attrs.get("acl"), Some(&s("public-read")));
    }

    #[test]
    fn write_only_values_are_carried() {
        let schema = ResourceSchema::new("bucket")
            .attribute(AttributeSchema::new("force_destroy", AttributeType::Bool).write_only())
            .attribute(AttributeSchema::new("acl", AttributeType::String));

        let mut prior = HashMap::new();
        prior.insert("force_destroy".to_string(), Value::Bool(true));
        prior.insert("acl".to_string(), s("private"));
        let mut read = HashMap::new();
        read.insert("acl".to_string(), s("public-read"));

        schema.carry_write_only(&prior, &mut read);
        assert_eq!(read.get("force_destroy"), Some(&Value::Bool(true)));
        assert_eq!(read.get("acl"), Some(&s("public-read")));
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&s("10.0.0.0/16")).is_ok());
        assert!(t.validate(&s("0.0.0.0/0")).is_ok());
        assert!(t.validate(&s("255.255.255.255/32")).is_ok());

        assert!(t.validate(&s("10.0.0.0")).is_err());
        assert!(t.validate(&s("10.0.0.0/33")).is_err());
        assert!(t.validate(&s("10.0.0.256/16")).is_err());
        assert!(t.validate(&s("10.0.0/16")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_arn_type() {
        let t = types::arn();
        assert!(t.validate(&s("arn:aws:iam::123456789012:role/admin")).is_ok());
        assert!(t.validate(&s("not-an-arn")).is_err());
    }
}
