//! Amazon Resource Names

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const PREFIX: &str = "arn";
const SECTIONS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArnError {
    #[error("arn: invalid prefix in '{0}'")]
    InvalidPrefix(String),

    #[error("arn: not enough sections in '{0}'")]
    NotEnoughSections(String),

    #[error("arn: missing partition in '{0}'")]
    MissingPartition(String),

    #[error("arn: missing service in '{0}'")]
    MissingService(String),

    #[error("arn: missing resource in '{0}'")]
    MissingResource(String),
}

/// A parsed ARN: `arn:partition:service:region:account-id:resource`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
}

impl Arn {
    pub fn parse(s: &str) -> Result<Self, ArnError> {
        if !s.starts_with("arn:") {
            return Err(ArnError::InvalidPrefix(s.to_string()));
        }
        let sections: Vec<&str> = s.splitn(SECTIONS, ':').collect();
        if sections.len() != SECTIONS {
            return Err(ArnError::NotEnoughSections(s.to_string()));
        }
        if sections[0] != PREFIX {
            return Err(ArnError::InvalidPrefix(s.to_string()));
        }
        if sections[1].is_empty() {
            return Err(ArnError::MissingPartition(s.to_string()));
        }
        if sections[2].is_empty() {
            return Err(ArnError::MissingService(s.to_string()));
        }
        if sections[5].is_empty() {
            return Err(ArnError::MissingResource(s.to_string()));
        }
        Ok(Self {
            partition: sections[1].to_string(),
            service: sections[2].to_string(),
            region: sections[3].to_string(),
            account_id: sections[4].to_string(),
            resource: sections[5].to_string(),
        })
    }

    /// Split the resource section into its type and id.
    ///
    /// `role/admin` and `log-group:app` yield a type; a bare name such as an
    /// S3 bucket yields `None` for the type.
    pub fn resource_parts(&self) -> (Option<&str>, &str) {
        match self.resource.find(['/', ':']) {
            Some(idx) => (Some(&self.resource[..idx]), &self.resource[idx + 1..]),
            None => (None, &self.resource),
        }
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

impl FromStr for Arn {
    type Err = ArnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn is_arn(s: &str) -> bool {
    Arn::parse(s).is_ok()
}

/// Partition a region belongs to
pub fn partition_for_region(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "aws-cn"
    } else if region.starts_with("us-gov-") {
        "aws-us-gov"
    } else if region.starts_with("us-iso-") {
        "aws-iso"
    } else if region.starts_with("us-isob-") {
        "aws-iso-b"
    } else {
        "aws"
    }
}
