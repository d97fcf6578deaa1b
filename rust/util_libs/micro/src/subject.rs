use crate::types::ConfigError;

/// Root of all control subjects.
pub const API_PREFIX: &str = "$SRV";

/// Queue group used across all services unless overridden.
pub const DEFAULT_QUEUE_GROUP: &str = "q";

/// The three monitoring verbs of the service protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceVerb {
    Ping,
    Info,
    Stats,
}

impl ServiceVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceVerb::Ping => "PING",
            ServiceVerb::Info => "INFO",
            ServiceVerb::Stats => "STATS",
        }
    }
}

impl std::fmt::Display for ServiceVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build a single control subject for a verb.
///
/// The shape depends on how much is narrowed down:
/// `$SRV.<VERB>` for the fleet, `$SRV.<VERB>.<service>` for one service
/// kind, `$SRV.<VERB>.<service>.<id>` for one instance.
pub fn control_subject(
    verb: ServiceVerb,
    service: Option<&str>,
    id: Option<&str>,
    api_prefix: &str,
) -> String {
    match (service, id) {
        (Some(service), Some(id)) => format!("{api_prefix}.{verb}.{service}.{id}"),
        (Some(service), None) => format!("{api_prefix}.{verb}.{service}"),
        _ => format!("{api_prefix}.{verb}"),
    }
}

/// The three control subjects a service instance subscribes for a verb.
pub fn control_subjects(verb: ServiceVerb, service: &str, id: &str, api_prefix: &str) -> [String; 3] {
    [
        control_subject(verb, None, None, api_prefix),
        control_subject(verb, Some(service), None, api_prefix),
        control_subject(verb, Some(service), Some(id), api_prefix),
    ]
}

/// Service names can only contain A-Z, a-z, 0-9, dash and underscore.
pub fn validate_service_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::InvalidServiceName(name.to_string()));
    }
    Ok(())
}

/// Service versions must be valid semver.
pub fn validate_service_version(version: &str) -> Result<(), ConfigError> {
    semver::Version::parse(version).map_err(|source| ConfigError::InvalidVersion {
        version: version.to_string(),
        source,
    })?;
    Ok(())
}
