//! Stratus AWS Provider
//!
//! Most resource types are driven through the AWS Cloud Control API: each one
//! is a [`cc_resource::ResourceDefinition`] describing its schema and how its
//! attributes map onto CloudFormation properties. S3 buckets talk to S3
//! directly so that `force_destroy` can empty them first.

pub mod cc_resource;
pub mod cloudcontrol;
pub mod conns;
pub mod convert;
pub mod errs;
pub mod provider;
pub mod s3;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use conns::AwsClient;
pub use provider::AwsProvider;
