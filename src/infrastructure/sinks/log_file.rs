//! Audit log file naming.
//!
//! `{log_dir}/{context}_{operation}_{date}.log` by default, where
//! `{operation}` is the operation's primary tag and `{date}` is the event
//! date as `yyyy-MM-dd` (UTC).

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::application::events::AuditEvent;
use crate::domain::ConfigurationError;

pub const DEFAULT_FILE_TEMPLATE: &str = "{context}_{operation}_{date}.log";

const PLACEHOLDERS: [&str; 3] = ["{context}", "{operation}", "{date}"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileCreator {
    log_dir: PathBuf,
    context: String,
    template: String,
}

impl LogFileCreator {
    pub fn new(log_dir: impl Into<PathBuf>, context: impl Into<String>) -> Self {
        Self {
            log_dir: log_dir.into(),
            context: context.into(),
            template: DEFAULT_FILE_TEMPLATE.to_string(),
        }
    }

    /// Replace the file name template.
    ///
    /// The template must name `{operation}` (one file per operation), may
    /// only use the known placeholders and must stay inside the log dir.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self, ConfigurationError> {
        let template = template.into();
        validate_template(&template)?;
        self.template = template;
        Ok(self)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn path_for(&self, operation_tag: &str, date: NaiveDate) -> PathBuf {
        let name = self
            .template
            .replace("{context}", &sanitize(&self.context))
            .replace("{operation}", &sanitize(operation_tag))
            .replace("{date}", &date.format("%Y-%m-%d").to_string());
        self.log_dir.join(name)
    }

    pub fn path_for_event(&self, event: &AuditEvent<'_>) -> PathBuf {
        self.path_for(event.operation().primary_tag(), event.timestamp().date_naive())
    }
}

fn validate_template(template: &str) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidTemplate(format!("{template:?}: {reason}"));

    if !template.contains("{operation}") {
        return Err(invalid("missing {operation}"));
    }
    if template.contains("..") || template.starts_with('/') || template.contains('\\') {
        return Err(invalid("must be a relative file name"));
    }

    let stripped = PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |acc, p| acc.replace(*p, ""));
    if stripped.contains('{') || stripped.contains('}') {
        return Err(invalid("unknown placeholder or stray brace"));
    }
    Ok(())
}

/// Keep file names portable: anything outside `[A-Za-z0-9._-]` becomes `_`.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
    }

    #[test]
    fn default_template() {
        let creator = LogFileCreator::new("/var/log/cpo", "hubject");
        assert_eq!(
            creator.path_for("remote-start", date()),
            PathBuf::from("/var/log/cpo/hubject_remote-start_2024-03-07.log")
        );
    }

    #[test]
    fn custom_template() {
        let creator = LogFileCreator::new("logs", "cpo")
            .with_template("{date}/{operation}.jsonl")
            .unwrap();
        assert_eq!(
            creator.path_for("remote-stop", date()),
            PathBuf::from("logs/2024-03-07/remote-stop.jsonl")
        );
    }

    #[test]
    fn rejects_bad_templates() {
        let base = LogFileCreator::new("logs", "cpo");
        for template in [
            "{context}_{date}.log",
            "{operation}_{hour}.log",
            "../{operation}.log",
            "/tmp/{operation}.log",
            "{operation}}.log",
        ] {
            let err = base.clone().with_template(template).unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidTemplate(_)), "{template}");
        }
    }

    #[test]
    fn components_are_sanitized() {
        let creator = LogFileCreator::new("logs", "cpo/../etc");
        let path = creator.path_for("remote start", date());
        assert_eq!(path, PathBuf::from("logs/cpo_.._etc_remote_start_2024-03-07.log"));
        assert_eq!(sanitize(".."), "_");
    }
}
