//! Payload checks run before a request reaches the registrar.

use shared::types::{BootstrapRequest, ManifestSubmission};

pub fn validate_bootstrap(request: &BootstrapRequest) -> Result<(), Vec<String>> {
    let identity = &request.identity;
    let mut errors = Vec::new();

    if identity.hostname.trim().is_empty() {
        errors.push("hostname must not be empty".to_string());
    }
    if identity.endpoint.trim().is_empty() {
        errors.push("endpoint must not be empty".to_string());
    }
    if identity.port == Some(0) {
        errors.push("port must be greater than 0".to_string());
    }
    if parse_version(&identity.app_version).is_none() {
        errors.push(format!("appVersion is not a valid version: {:?}", identity.app_version));
    }
    if parse_version(&identity.protocol_version).is_none() {
        errors.push(format!(
            "protocolVersion is not a valid version: {:?}",
            identity.protocol_version
        ));
    }
    match &request.supported_protocols {
        None => errors.push("supportedProtocols is required".to_string()),
        Some(protocols) if protocols.contains(&0) => {
            errors.push("supportedProtocols entries must be greater than 0".to_string())
        }
        Some(_) => {}
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

pub fn validate_manifest(submission: &ManifestSubmission) -> Result<(), Vec<String>> {
    if submission.manifest.trim().is_empty() {
        return Err(vec!["manifest must not be empty".to_string()]);
    }
    Ok(())
}

/// Semantic version, accepting "1" and "1.2" as "1.0.0" and "1.2.0".
fn parse_version(value: &str) -> Option<semver::Version> {
    if let Ok(version) = semver::Version::parse(value) {
        return Some(version);
    }

    let (core, rest) = match value.find(['-', '+']) {
        Some(i) => value.split_at(i),
        None => (value, ""),
    };
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{rest}"),
        2 => format!("{core}.0{rest}"),
        _ => return None,
    };
    semver::Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::ServiceIdentity;

    fn valid_request() -> BootstrapRequest {
        BootstrapRequest {
            identity: ServiceIdentity {
                hostname: "web-01".to_string(),
                endpoint: "http://web-01/manifest".to_string(),
                port: Some(8080),
                app_name: "Shop".to_string(),
                app_version: "1.2.0".to_string(),
                protocol_version: "1.0".to_string(),
            },
            supported_protocols: Some(vec![1, 2]),
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(validate_bootstrap(&valid_request()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut request = valid_request();
        request.identity.hostname = " ".to_string();
        request.identity.port = Some(0);
        request.identity.app_version = "banana".to_string();
        request.supported_protocols = Some(vec![1, 0]);

        let errors = validate_bootstrap(&request).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_missing_protocols_rejected() {
        let mut request = valid_request();
        request.supported_protocols = None;
        assert!(validate_bootstrap(&request).is_err());
    }

    #[test]
    fn test_empty_protocol_list_allowed() {
        // An empty list is a negotiation failure, not a malformed payload
        let mut request = valid_request();
        request.supported_protocols = Some(Vec::new());
        assert!(validate_bootstrap(&request).is_ok());
    }

    #[test]
    fn test_version_padding() {
        assert_eq!(parse_version("1"), Some(semver::Version::new(1, 0, 0)));
        assert_eq!(parse_version("1.2"), Some(semver::Version::new(1, 2, 0)));
        assert!(parse_version("1.2-beta").is_some_and(|v| v.pre.as_str() == "beta"));
        assert!(parse_version("1.2.3.4").is_none());
        assert!(parse_version("").is_none());
    }

    #[test]
    fn test_empty_manifest_rejected() {
        let submission = ManifestSubmission { manifest: String::new() };
        assert!(validate_manifest(&submission).is_err());

        let submission = ManifestSubmission { manifest: "{}".to_string() };
        assert!(validate_manifest(&submission).is_ok());
    }
}
