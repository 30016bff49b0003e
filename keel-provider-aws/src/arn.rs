//! ARN helpers

use std::fmt;

/// Account and partition of the credentials in use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account_id: String,
    pub partition: String,
}

impl CallerIdentity {
    /// Derive the partition from the caller ARN returned by STS
    pub fn from_caller_arn(account_id: &str, caller_arn: &str) -> Self {
        let partition = Arn::parse(caller_arn)
            .map(|arn| arn.partition)
            .unwrap_or_else(|| "aws".to_string());
        Self {
            account_id: account_id.to_string(),
            partition,
        }
    }
}

/// `arn:<partition>:<service>:<region>:<account>:<resource>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
}

impl Arn {
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(6, ':');
        if parts.next()? != "arn" {
            return None;
        }
        let arn = Self {
            partition: parts.next()?.to_string(),
            service: parts.next()?.to_string(),
            region: parts.next()?.to_string(),
            account_id: parts.next()?.to_string(),
            resource: parts.next()?.to_string(),
        };
        if arn.partition.is_empty() || arn.service.is_empty() {
            return None;
        }
        Some(arn)
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

/// Build an ARN for a regional resource owned by the caller
pub fn regional(caller: &CallerIdentity, service: &str, region: &str, resource: &str) -> String {
    Arn {
        partition: caller.partition.clone(),
        service: service.to_string(),
        region: region.to_string(),
        account_id: caller.account_id.clone(),
        resource: resource.to_string(),
    }
    .to_string()
}

/// S3 bucket ARNs carry neither region nor account
pub fn s3_bucket(partition: &str, bucket: &str) -> String {
    format!("arn:{}:s3:::{}", partition, bucket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let arn = Arn::parse("arn:aws:iam::123456789012:role/service-role/test").unwrap();
        assert_eq!(arn.service, "iam");
        assert_eq!(arn.region, "");
        assert_eq!(arn.resource, "role/service-role/test");
        assert_eq!(
            arn.to_string(),
            "arn:aws:iam::123456789012:role/service-role/test"
        );
    }

    #[test]
    fn resource_may_contain_colons() {
        let arn = Arn::parse("arn:aws:logs:us-west-2:123456789012:log-group:/x:*").unwrap();
        assert_eq!(arn.resource, "log-group:/x:*");
    }

    #[test]
    fn rejects_non_arns() {
        assert!(Arn::parse("fs-12345678").is_none());
        assert!(Arn::parse("arn:aws:iam").is_none());
    }

    #[test]
    fn partition_comes_from_caller_arn() {
        let caller = CallerIdentity::from_caller_arn(
            "123456789012",
            "arn:aws-us-gov:iam::123456789012:user/ci",
        );
        assert_eq!(caller.partition, "aws-us-gov");
        assert_eq!(
            regional(&caller, "codepipeline", "us-gov-west-1", "tf-test"),
            "arn:aws-us-gov:codepipeline:us-gov-west-1:123456789012:tf-test"
        );
        assert_eq!(
            CallerIdentity::from_caller_arn("1", "garbage").partition,
            "aws"
        );
    }

    #[test]
    fn bucket_arn() {
        assert_eq!(s3_bucket("aws", "my-bucket"), "arn:aws:s3:::my-bucket");
    }
}
