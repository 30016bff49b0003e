//! AWS-specific type definitions

use std::sync::LazyLock;

use keel_core::resource::Value;
use keel_core::schema::AttributeType;
use regex::Regex;

static PIPELINE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9.@\-_]{1,100}$").expect("valid pipeline name pattern")
});

static IAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w+=,.@-]{1,64}$").expect("valid IAM name pattern"));

/// Valid AWS regions
const VALID_REGIONS: &[&str] = &[
    "af-south-1",
    "ap-east-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-south-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-south-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "me-south-1",
    "sa-east-1",
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
];

/// AWS region such as "us-west-2"
pub fn aws_region() -> AttributeType {
    AttributeType::Custom {
        name: "Region".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                if VALID_REGIONS.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!(
                        "Invalid region '{}', expected one of: {}",
                        s,
                        VALID_REGIONS.join(", ")
                    ))
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// ARN string (`arn:<partition>:<service>:...`)
pub fn arn() -> AttributeType {
    AttributeType::Custom {
        name: "Arn".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                if s.starts_with("arn:") && s.split(':').count() >= 6 {
                    Ok(())
                } else {
                    Err(format!("Invalid ARN '{}'", s))
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// Pipeline name: 1-100 of `A-Za-z0-9.@-_`
pub fn pipeline_name() -> AttributeType {
    AttributeType::Custom {
        name: "PipelineName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                if !PIPELINE_NAME.is_match(s) {
                    Err(format!(
                        "Invalid pipeline name '{}': use 1-100 letters, digits, '.', '@', '-' or '_'",
                        s
                    ))
                } else {
                    Ok(())
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// IAM role or policy name: 1-64 of `\w+=,.@-`
pub fn iam_name() -> AttributeType {
    AttributeType::Custom {
        name: "IamName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                if !IAM_NAME.is_match(s) {
                    Err(format!("Invalid IAM name '{}'", s))
                } else {
                    Ok(())
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// Maximum session duration of a role, 1 to 12 hours in seconds
pub fn max_session_duration() -> AttributeType {
    AttributeType::Custom {
        name: "MaxSessionDuration".to_string(),
        base: Box::new(AttributeType::Int),
        validate: |value| match value {
            Value::Int(n) if (3600..=43200).contains(n) => Ok(()),
            Value::Int(n) => Err(format!(
                "max_session_duration must be between 3600 and 43200, got {}",
                n
            )),
            _ => Err("Expected integer".to_string()),
        },
    }
}

/// S3 bucket name (3-63 chars, lowercase, digits, dots, hyphens)
pub fn s3_bucket_name() -> AttributeType {
    AttributeType::Custom {
        name: "BucketName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            if let Value::String(s) = value {
                let valid_chars = s
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
                let valid_edges = s
                    .chars()
                    .next()
                    .zip(s.chars().last())
                    .is_some_and(|(a, b)| a.is_ascii_alphanumeric() && b.is_ascii_alphanumeric());
                if (3..=63).contains(&s.len()) && valid_chars && valid_edges {
                    Ok(())
                } else {
                    Err(format!("Invalid bucket name '{}'", s))
                }
            } else {
                Err("Expected string".to_string())
            }
        },
    }
}

/// S3 bucket versioning status
/// - Enabled: Versioning is enabled
/// - Suspended: Versioning is suspended (previously enabled)
pub fn versioning_status() -> AttributeType {
    AttributeType::Enum(vec!["Enabled".to_string(), "Suspended".to_string()])
}

/// Source provider of a CodeStar connection
pub fn connection_provider_type() -> AttributeType {
    AttributeType::Enum(
        ["Bitbucket", "GitHub", "GitHubEnterpriseServer", "GitLab"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_accepts_aws_format() {
        assert!(aws_region().validate(&Value::from("us-west-2")).is_ok());
    }

    #[test]
    fn region_rejects_availability_zone() {
        let err = aws_region()
            .validate(&Value::from("us-west-2a"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Invalid region"));
        assert!(err.contains("eu-west-1"));
    }

    #[test]
    fn region_validates_all_valid_regions() {
        let region_type = aws_region();
        for region in VALID_REGIONS {
            assert!(
                region_type.validate(&Value::from(*region)).is_ok(),
                "Region {} should be valid",
                region
            );
        }
    }

    #[test]
    fn arn_requires_six_parts() {
        assert!(
            arn()
                .validate(&Value::from("arn:aws:iam::123456789012:role/test"))
                .is_ok()
        );
        assert!(arn().validate(&Value::from("role/test")).is_err());
    }

    #[test]
    fn pipeline_name_charset() {
        assert!(pipeline_name().validate(&Value::from("tf-test-pipeline-1")).is_ok());
        assert!(pipeline_name().validate(&Value::from("has space")).is_err());
        assert!(pipeline_name().validate(&Value::from("")).is_err());
        assert!(pipeline_name().validate(&Value::from("a".repeat(101))).is_err());
    }

    #[test]
    fn iam_name_charset() {
        assert!(iam_name().validate(&Value::from("codepipeline_policy")).is_ok());
        assert!(iam_name().validate(&Value::from("a/b")).is_err());
        assert!(iam_name().validate(&Value::from("a".repeat(65))).is_err());
    }

    #[test]
    fn session_duration_range() {
        let t = max_session_duration();
        assert!(t.validate(&Value::Int(3600)).is_ok());
        assert!(t.validate(&Value::Int(43200)).is_ok());
        assert!(t.validate(&Value::Int(60)).is_err());
        assert!(t.validate(&Value::from("3600")).is_err());
    }

    #[test]
    fn bucket_name_rules() {
        let t = s3_bucket_name();
        assert!(t.validate(&Value::from("tf-test-pipeline-1")).is_ok());
        assert!(t.validate(&Value::from("ab")).is_err());
        assert!(t.validate(&Value::from("Upper")).is_err());
        assert!(t.validate(&Value::from("-leading")).is_err());
    }

    #[test]
    fn versioning_status_valid_values() {
        let status = versioning_status();
        assert!(status.validate(&Value::from("Enabled")).is_ok());
        assert!(status.validate(&Value::from("Suspended")).is_ok());
        assert!(status.validate(&Value::from("enabled")).is_err());
    }

    #[test]
    fn connection_provider_types() {
        let t = connection_provider_type();
        assert!(t.validate(&Value::from("GitHub")).is_ok());
        assert!(t.validate(&Value::from("CodeCommit")).is_err());
    }
}
