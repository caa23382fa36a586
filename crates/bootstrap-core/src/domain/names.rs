//! Deterministic resource naming.
//!
//! Every name a run touches is derived here exactly once and then threaded
//! through deploy, output extraction and CI configuration. Derivation is a
//! pure function of the validated request.

use serde::Serialize;

use super::error::InputValidationError;
use super::request::BootstrapRequest;

/// The access-log bucket is named `{state bucket}-logs`, so the state bucket
/// has to leave room for the suffix within S3's 63 character limit.
pub const LOG_BUCKET_SUFFIX: &str = "-logs";
pub const MAX_STATE_BUCKET_LEN: usize = 63 - LOG_BUCKET_SUFFIX.len();

const MAX_TABLE_LEN: usize = 255;
const MAX_ROLE_LEN: usize = 64;
const MAX_STACK_LEN: usize = 128;

/// Names of every resource owned by one tenant/environment pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedNames {
    pub stack_name: String,
    pub state_bucket_name: String,
    pub state_table_name: String,
    pub plan_role_name: String,
    pub apply_role_name: String,
}

impl DerivedNames {
    /// Derive and validate all names for `request`.
    pub fn derive(request: &BootstrapRequest) -> Result<Self, InputValidationError> {
        let org = request.organization();
        let tenant = request.tenant();
        let env = request.environment().as_str();

        let names = DerivedNames {
            stack_name: format!("{org}-cf-{tenant}-{env}-tfstate"),
            state_bucket_name: format!("{org}-s3-{tenant}-{env}-tfstate"),
            state_table_name: format!("{org}-ddbtable-{tenant}-{env}-tfstate"),
            plan_role_name: format!("{org}-role-tfplan-{tenant}-{env}"),
            apply_role_name: format!("{org}-role-tfapply-{tenant}-{env}"),
        };

        validate_stack_name(&names.stack_name)?;
        validate_bucket_name(&names.state_bucket_name)?;
        validate_table_name(&names.state_table_name)?;
        validate_role_name(&names.plan_role_name)?;
        validate_role_name(&names.apply_role_name)?;
        Ok(names)
    }

    pub fn log_bucket_name(&self) -> String {
        format!("{}{}", self.state_bucket_name, LOG_BUCKET_SUFFIX)
    }
}

fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> InputValidationError {
    InputValidationError::InvalidResourceName {
        kind,
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn check_length(
    kind: &'static str,
    name: &str,
    min: usize,
    max: usize,
) -> Result<(), InputValidationError> {
    let len = name.len();
    if len < min || len > max {
        return Err(invalid(
            kind,
            name,
            format!("length {len} outside {min}..={max}"),
        ));
    }
    Ok(())
}

fn validate_bucket_name(name: &str) -> Result<(), InputValidationError> {
    const KIND: &str = "S3 bucket";
    check_length(KIND, name, 3, MAX_STATE_BUCKET_LEN)?;

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(invalid(
            KIND,
            name,
            format!("character '{c}' not allowed (lowercase letters, digits, '-' and '.')"),
        ));
    }

    let alnum = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alnum(name.chars().next()) || !alnum(name.chars().last()) {
        return Err(invalid(KIND, name, "must start and end with a letter or digit"));
    }
    if name.contains("..") {
        return Err(invalid(KIND, name, "must not contain '..'"));
    }
    if name.starts_with("xn--") {
        return Err(invalid(KIND, name, "must not start with 'xn--'"));
    }
    if name.parse::<std::net::Ipv4Addr>().is_ok() {
        return Err(invalid(KIND, name, "must not be formatted as an IP address"));
    }
    Ok(())
}

fn validate_table_name(name: &str) -> Result<(), InputValidationError> {
    const KIND: &str = "DynamoDB table";
    check_length(KIND, name, 3, MAX_TABLE_LEN)?;
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(invalid(KIND, name, format!("character '{c}' not allowed")));
    }
    Ok(())
}

fn validate_role_name(name: &str) -> Result<(), InputValidationError> {
    const KIND: &str = "IAM role";
    check_length(KIND, name, 1, MAX_ROLE_LEN)?;
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "+=,.@_-".contains(*c)))
    {
        return Err(invalid(KIND, name, format!("character '{c}' not allowed")));
    }
    Ok(())
}

fn validate_stack_name(name: &str) -> Result<(), InputValidationError> {
    const KIND: &str = "CloudFormation stack";
    check_length(KIND, name, 1, MAX_STACK_LEN)?;
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(invalid(KIND, name, "must start with a letter"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(invalid(KIND, name, format!("character '{c}' not allowed")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::{BootstrapInput, Environment};

    fn request(tenant: &str, env: &str, url: &str) -> BootstrapRequest {
        BootstrapRequest::from_input(&BootstrapInput {
            tenant: tenant.to_string(),
            environment: env.to_string(),
            repository_url: url.to_string(),
            region: "us-east-1".to_string(),
            organization: None,
        })
        .unwrap()
    }

    #[test]
    fn test_contoso_names() {
        let names =
            DerivedNames::derive(&request("dataops", "dev", "github.com/contoso/infra")).unwrap();
        assert_eq!(names.stack_name, "contoso-cf-dataops-dev-tfstate");
        assert_eq!(names.state_bucket_name, "contoso-s3-dataops-dev-tfstate");
        assert_eq!(names.state_table_name, "contoso-ddbtable-dataops-dev-tfstate");
        assert_eq!(names.plan_role_name, "contoso-role-tfplan-dataops-dev");
        assert_eq!(names.apply_role_name, "contoso-role-tfapply-dataops-dev");
        assert_eq!(names.log_bucket_name(), "contoso-s3-dataops-dev-tfstate-logs");
    }

    #[test]
    fn test_derivation_is_deterministic_for_every_environment() {
        for env in Environment::ALL {
            let req = request("payments", env.as_str(), "git@github.com:Contoso/infra.git");
            let first = DerivedNames::derive(&req).unwrap();
            let second = DerivedNames::derive(&req.clone()).unwrap();
            assert_eq!(first, second);
            assert!(first.stack_name.ends_with(&format!("-{env}-tfstate")));
            assert!(first.plan_role_name.ends_with(&format!("-{env}")));
        }
    }

    #[test]
    fn test_uppercase_tenant_is_an_invalid_bucket_name() {
        let err =
            DerivedNames::derive(&request("DataOps", "dev", "github.com/contoso/infra")).unwrap_err();
        match err {
            InputValidationError::InvalidResourceName { kind, name, .. } => {
                assert_eq!(kind, "S3 bucket");
                assert_eq!(name, "contoso-s3-DataOps-dev-tfstate");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bucket_leaves_room_for_log_suffix() {
        // 59 characters: valid for S3 alone, too long once "-logs" is added.
        let tenant = "t".repeat(59 - "contoso-s3--dev-tfstate".len());
        let err = DerivedNames::derive(&request(&tenant, "dev", "github.com/contoso/infra"))
            .unwrap_err();
        assert!(matches!(
            err,
            InputValidationError::InvalidResourceName { kind: "S3 bucket", .. }
        ));

        let tenant = "t".repeat(58 - "contoso-s3--dev-tfstate".len());
        let names =
            DerivedNames::derive(&request(&tenant, "dev", "github.com/contoso/infra")).unwrap();
        assert_eq!(names.log_bucket_name().len(), 63);
    }

    #[test]
    fn test_role_name_length_limit() {
        assert!(validate_role_name(&"r".repeat(64)).is_ok());
        assert!(validate_role_name(&"r".repeat(65)).is_err());
        assert!(validate_role_name("role with space").is_err());
    }

    #[test]
    fn test_bucket_rules() {
        assert!(validate_bucket_name("a.b-c").is_ok());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("-abc").is_err());
        assert!(validate_bucket_name("abc.").is_err());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
        assert!(validate_bucket_name("xn--abc").is_err());
        assert!(validate_bucket_name("under_score").is_err());
    }

    #[test]
    fn test_stack_rules() {
        assert!(validate_stack_name("a-1").is_ok());
        assert!(validate_stack_name("1-a").is_err());
        assert!(validate_stack_name("a_b").is_err());
        assert!(validate_table_name("a_b.c-d").is_ok());
        assert!(validate_table_name("a b c").is_err());
    }
}
