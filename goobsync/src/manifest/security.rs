//! Pre-flight rejection of files that look like secrets
//!
//! The deny-list is fixed and independent of the project's own include and
//! exclude rules. It runs before the manifest leaves the machine.

use tracing::warn;

use crate::errors::EngineError;

/// How a deny rule matches a lower-cased name
#[derive(Debug, Clone, Copy)]
enum DenyRule {
    Exact(&'static str),
    Contains(&'static str),
    EndsWith(&'static str),
}

impl DenyRule {
    fn matches(self, candidate: &str) -> bool {
        match self {
            DenyRule::Exact(name) => candidate == name,
            DenyRule::Contains(needle) => candidate.contains(needle),
            DenyRule::EndsWith(suffix) => candidate.ends_with(suffix),
        }
    }
}

/// Rules applied to the basename only
const BASENAME_RULES: &[DenyRule] = &[
    DenyRule::Exact(".env"),
    DenyRule::Exact("id_rsa"),
    DenyRule::Exact("id_dsa"),
    DenyRule::Exact("id_ecdsa"),
    DenyRule::Exact("id_ed25519"),
    DenyRule::Exact("credentials.json"),
    DenyRule::Exact(".netrc"),
    DenyRule::Exact(".npmrc"),
    DenyRule::Exact(".pypirc"),
    DenyRule::Exact(".htpasswd"),
    DenyRule::Exact(".git-credentials"),
];

/// Rules applied to both the basename and the full relative path
const PATH_RULES: &[DenyRule] = &[
    DenyRule::Contains(".env."),
    DenyRule::EndsWith(".pem"),
    DenyRule::EndsWith(".key"),
    DenyRule::EndsWith(".p12"),
    DenyRule::EndsWith(".pfx"),
    DenyRule::Contains("secret"),
    DenyRule::Contains("password"),
];

/// True if `rel_path` matches the deny-list
pub fn is_denied(rel_path: &str) -> bool {
    let full = rel_path.to_lowercase();
    let basename = full.rsplit('/').next().unwrap_or(&full);

    BASENAME_RULES.iter().any(|rule| rule.matches(basename))
        || PATH_RULES
            .iter()
            .any(|rule| rule.matches(basename) || rule.matches(&full))
}

/// Fail with `EngineError::Security` listing every offending path
pub fn validate<S: AsRef<str>>(files: &[S]) -> Result<(), EngineError> {
    let offending: Vec<String> = files
        .iter()
        .filter_map(|path| {
            let path: &str = path.as_ref();
            is_denied(path).then(|| path.to_string())
        })
        .collect();

    if offending.is_empty() {
        return Ok(());
    }

    for path in &offending {
        warn!("Disallowed file in deploy set: {}", path);
    }
    Err(EngineError::Security { paths: offending })
}
