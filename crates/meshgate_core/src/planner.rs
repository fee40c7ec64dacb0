//! Turns a raw request body into a [`RunPlan`].
//!
//! Everything here runs before the runtime is touched, so any rejection leaves no container behind.

use crate::constants::{env, fields};
use crate::error::ValidationError;
use crate::job::{JobRequest, RunPlan};
use crate::traits::EnvironmentProvider;
use crate::variant::VariantProfile;
use serde_json::Value;

/// Validates the shape of a `POST /process` body.
///
/// Absent fields take their defaults, present fields must have the exact JSON type.
/// `null` counts as present.
pub fn parse_request(body: &Value, default_tag: &str) -> Result<JobRequest, ValidationError> {
    let obj = body.as_object().ok_or(ValidationError::NotAnObject)?;

    let build_requested = match obj.get(fields::SHOULD_BUILD) {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(invalid(fields::SHOULD_BUILD, "boolean")),
    };

    let image_tag = match obj.get(fields::IMAGE_NAME) {
        None => default_tag.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(invalid(fields::IMAGE_NAME, "string")),
    };

    let job_id = match obj.get(fields::JOB_ID) {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(invalid(fields::JOB_ID, "string")),
    };

    Ok(JobRequest {
        build_requested,
        image_tag,
        job_id,
    })
}

fn invalid(field: &'static str, expected: &'static str) -> ValidationError {
    ValidationError::InvalidField { field, expected }
}

/// Snapshot of the secrets a container needs, taken once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnvironment {
    entries: Vec<(String, Option<String>)>,
}

impl RunEnvironment {
    /// Resolves [`env::REQUIRED`] from `provider`.
    pub fn snapshot<E: EnvironmentProvider>(provider: &E) -> Self {
        Self::resolve(provider, env::REQUIRED)
    }

    pub fn resolve<'a, E: EnvironmentProvider>(
        provider: &E,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| {
                let value = provider.get(key).filter(|v| is_defined(v));
                (key.to_string(), value)
            })
            .collect();
        Self { entries }
    }

    /// Names of the entries without a usable value.
    pub fn missing(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Fails with every missing name at once.
    pub fn into_complete(self) -> Result<Vec<(String, String)>, ValidationError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ValidationError::MissingEnvironment(missing));
        }

        Ok(self
            .entries
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }
}

fn is_defined(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && value != env::PLACEHOLDER
}

/// Assembles the launch configuration for `request`.
pub fn plan(
    request: &JobRequest,
    profile: &VariantProfile,
    environment: RunEnvironment,
) -> Result<RunPlan, ValidationError> {
    let env = environment.into_complete()?;
    let job_id = request.job_id.as_deref();

    Ok(RunPlan {
        tag: request.image_tag.clone(),
        args: profile
            .invocation_args
            .iter()
            .map(|arg| arg.render(job_id))
            .collect(),
        env,
        bindings: profile.volume_bindings.clone(),
        device_requests: profile.device_requests.clone(),
        auto_remove: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StaticEnv;
    use crate::variant::VariantRegistry;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn full_env() -> StaticEnv {
        StaticEnv::new(env::REQUIRED.map(|k| (k, format!("{k}-value"))))
    }

    #[test]
    fn empty_body_takes_defaults() {
        let req = parse_request(&json!({}), "cpu").unwrap();
        assert_eq!(
            req,
            JobRequest {
                build_requested: false,
                image_tag: "cpu".into(),
                job_id: None,
            }
        );
    }

    #[test]
    fn wire_fields_are_read() {
        let body = json!({
            "shouldBuild": true,
            "imageName": "photogrammetry-gpu",
            "photogrammetryId": "scan-7",
            "somethingElse": 1,
        });
        let req = parse_request(&body, "cpu").unwrap();
        assert!(req.build_requested);
        assert_eq!(req.image_tag, "photogrammetry-gpu");
        assert_eq!(req.job_id.as_deref(), Some("scan-7"));
    }

    #[test]
    fn wrong_types_are_rejected_not_coerced() {
        let cases = [
            (json!({"shouldBuild": "true"}), "shouldBuild", "boolean"),
            (json!({"shouldBuild": 1}), "shouldBuild", "boolean"),
            (json!({"shouldBuild": null}), "shouldBuild", "boolean"),
            (json!({"imageName": 3}), "imageName", "string"),
            (json!({"imageName": ["a"]}), "imageName", "string"),
            (json!({"photogrammetryId": 42}), "photogrammetryId", "string"),
            (json!({"photogrammetryId": {}}), "photogrammetryId", "string"),
        ];

        for (body, field, expected) in cases {
            assert_eq!(
                parse_request(&body, "cpu"),
                Err(ValidationError::InvalidField { field, expected }),
                "{body}"
            );
        }
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert_eq!(
            parse_request(&json!([1, 2]), "cpu"),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn plan_substitutes_job_id_and_always_auto_removes() {
        let registry = VariantRegistry::default();
        let req = JobRequest {
            job_id: Some("scan-1".into()),
            ..Default::default()
        };

        let plan = plan(
            &req,
            registry.resolve(&req.image_tag),
            RunEnvironment::snapshot(&full_env()),
        )
        .unwrap();

        assert_eq!(plan.tag, "photogrammetry-cpu");
        assert_eq!(plan.args, vec!["scan-1".to_string()]);
        assert!(plan.auto_remove);
        assert!(plan.bindings.is_empty());
        assert_eq!(plan.device_requests, None);
        assert_eq!(plan.env.len(), env::REQUIRED.len());
        assert_eq!(plan.env_list()[0], "AWS_REGION=AWS_REGION-value");
    }

    #[test]
    fn missing_job_id_is_passed_through_empty() {
        let req = JobRequest::default();
        let plan = plan(
            &req,
            &VariantProfile::cpu(),
            RunEnvironment::snapshot(&full_env()),
        )
        .unwrap();
        assert_eq!(plan.args, vec![String::new()]);
    }

    #[test]
    fn unset_and_placeholder_secrets_are_reported_together() {
        let provider = StaticEnv::new([
            (env::AWS_REGION, "eu-central-1"),
            (env::AWS_ACCESS_KEY_ID, "undefined"),
            (env::AWS_SECRET_ACCESS_KEY, "  "),
        ]);

        let err = plan(
            &JobRequest::default(),
            &VariantProfile::cpu(),
            RunEnvironment::snapshot(&provider),
        )
        .unwrap_err();

        assert_eq!(
            err,
            ValidationError::MissingEnvironment(vec![
                env::AWS_ACCESS_KEY_ID.to_string(),
                env::AWS_SECRET_ACCESS_KEY.to_string(),
                env::S3_BUCKET_NAME.to_string(),
            ])
        );
    }
}
