//! Turning a tenant's configuration into a direct Postgres connection string.

use crate::domain::error::{SyncError, SyncResult};
use crate::infra::config::Settings;
use crate::infra::tenant_config::{TenantConfig, DEFAULT_SCHEMA, KEY_DB_TOKEN, KEY_DB_URL};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left as-is in an encoded credential (RFC 3986 unreserved).
const CREDENTIAL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const HOSTED_DB_PORT: u16 = 5432;

/// Everything needed to open a pool for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub url: String,
    /// Schema the tenant's tables live in.
    pub schema: String,
    pub max_connections: Option<u32>,
}

pub fn encode_credential(raw: &str) -> String {
    utf8_percent_encode(raw, CREDENTIAL).to_string()
}

/// Decodes then re-encodes, so an already encoded credential is stable.
fn reencode_credential(raw: &str) -> String {
    encode_credential(&percent_decode_str(raw).decode_utf8_lossy())
}

struct PostgresUrlParts<'a> {
    scheme: &'a str,
    user: &'a str,
    password: Option<&'a str>,
    rest: &'a str,
}

fn split_postgres_url(url: &str) -> Option<PostgresUrlParts<'_>> {
    let (scheme, after) = url.split_once("://")?;
    if scheme != "postgres" && scheme != "postgresql" {
        return None;
    }
    // the last '@' ends the user info; unencoded passwords may contain '@'
    let at = after.rfind('@')?;
    let (userinfo, rest) = (&after[..at], &after[at + 1..]);
    let (user, password) = match userinfo.split_once(':') {
        Some((user, password)) => (user, Some(password)),
        None => (userinfo, None),
    };
    Some(PostgresUrlParts {
        scheme,
        user,
        password,
        rest,
    })
}

/// Re-encodes the password of a `postgres://` URL. Other strings are returned
/// unchanged.
pub fn normalize_postgres_url(url: &str) -> String {
    match split_postgres_url(url) {
        Some(PostgresUrlParts {
            scheme,
            user,
            password: Some(password),
            rest,
        }) => format!(
            "{}://{}:{}@{}",
            scheme,
            user,
            reencode_credential(password),
            rest
        ),
        _ => url.to_string(),
    }
}

/// Rewrites `https://<project>.<hosted_domain>` into the direct database URL
/// of that project. Postgres URLs get their password re-encoded; anything else
/// passes through untouched.
pub fn hosted_to_postgres_url(location: &str, credential: &str, hosted_domain: &str) -> String {
    let location = location.trim();
    if split_postgres_url(location).is_some() {
        return normalize_postgres_url(location);
    }

    let host = location
        .strip_prefix("https://")
        .or_else(|| location.strip_prefix("http://"))
        .unwrap_or(location)
        .trim_end_matches('/');
    let suffix = format!(".{}", hosted_domain);
    match host.strip_suffix(&suffix) {
        Some(project) if !project.is_empty() && !project.contains('/') => format!(
            "postgresql://postgres:{}@db.{}.{}:{}/postgres",
            encode_credential(credential),
            project,
            hosted_domain,
            HOSTED_DB_PORT
        ),
        _ => location.to_string(),
    }
}

/// Masks the password of a Postgres URL for logging.
pub fn redact(url: &str) -> String {
    match split_postgres_url(url) {
        Some(PostgresUrlParts {
            scheme,
            user,
            password: Some(_),
            rest,
        }) => format!("{}://{}:***@{}", scheme, user, rest),
        _ => url.to_string(),
    }
}

/// Resolves where a tenant's pool should connect.
///
/// A process-wide `DATABASE_URL` wins and makes tenant configuration optional.
/// Otherwise the tenant must be configured with a location and a credential,
/// the latter falling back to `DATABASE_SECRET`.
pub fn resolve_target(
    tenant_id: &str,
    config: Option<&TenantConfig>,
    settings: &Settings,
) -> SyncResult<ConnectionTarget> {
    let schema = config
        .map(|c| c.schema_name().to_string())
        .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
    let max_connections = config.and_then(|c| c.max_connections());

    if let Some(global) = &settings.database_url {
        return Ok(ConnectionTarget {
            url: normalize_postgres_url(global),
            schema,
            max_connections,
        });
    }

    let config =
        config.ok_or_else(|| SyncError::config_not_found(tenant_id, "tenant is not configured"))?;
    let location = config
        .location()
        .ok_or_else(|| SyncError::config_not_found(tenant_id, format!("missing {}", KEY_DB_URL)))?;
    let credential = config
        .credential()
        .or(settings.database_secret.as_deref())
        .ok_or_else(|| {
            SyncError::config_not_found(
                tenant_id,
                format!("missing {} and no DATABASE_SECRET is set", KEY_DB_TOKEN),
            )
        })?;

    Ok(ConnectionTarget {
        url: hosted_to_postgres_url(location, credential, &settings.hosted_db_domain),
        schema,
        max_connections,
    })
}
