use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use serde::Deserialize;

use crate::config::Project;
use crate::constants::HTTP_TIMEOUT;

/// Payload of a project's `info` endpoint; only `tail` matters here.
#[derive(Debug, Deserialize)]
struct InfoDoc {
    tail: Option<String>,
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// GET a resolver endpoint, returning the media type and body.
/// Non-2xx answers surface as errors.
fn fetch(url: &str) -> Result<(String, String)> {
    debug!("GET {}", url);
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(HTTP_TIMEOUT))
        .build()
        .into();
    let mut response = agent
        .get(url)
        .call()
        .with_context(|| format!("GET {} failed", url))?;
    let media_type = response
        .headers()
        .get("Content-Type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    let body = response
        .body_mut()
        .read_to_string()
        .with_context(|| format!("failed to read response body from {}", url))?;
    Ok((media_type, body))
}

/// Name of the group a deploy rolls into.
///
/// Precedence: the `info` endpoint (YAML with a `tail` field), then a
/// literal `inactive` group name, then `inactive` as a URL whose body
/// is the group name.
pub fn inactive_group(project_name: &str, project: &Project) -> Result<String> {
    if let Some(url) = &project.info {
        let (media_type, body) = fetch(url)?;
        if media_type != "text/yaml" {
            bail!(
                "project '{}': {} answered content type '{}' instead of text/yaml",
                project_name,
                url,
                media_type
            );
        }
        let doc: InfoDoc = serde_yaml::from_str(&body)
            .with_context(|| format!("project '{}': invalid YAML from {}", project_name, url))?;
        return doc.tail.ok_or_else(|| {
            anyhow!("project '{}': no tail field in document from {}", project_name, url)
        });
    }

    match project.inactive.as_deref() {
        Some(value) if !is_url(value) => Ok(value.to_string()),
        Some(url) => {
            let (_media_type, body) = fetch(url)?;
            let group = body.trim();
            if group.is_empty() {
                bail!("project '{}': {} answered an empty group name", project_name, url);
            }
            Ok(group.to_string())
        }
        None => bail!(
            "project '{}': neither info nor inactive is configured",
            project_name
        ),
    }
}

/// The counterpart of the resolved inactive group, for restarting the
/// live side. Only defined for projects with exactly two groups.
pub fn active_group(project_name: &str, project: &Project) -> Result<String> {
    if project.groups.len() != 2 {
        bail!(
            "project '{}': --active needs exactly two groups, found {}",
            project_name,
            project.groups.len()
        );
    }
    let inactive = inactive_group(project_name, project)?;
    if !project.groups.contains_key(&inactive) {
        bail!(
            "project '{}': resolved inactive group '{}' is not configured",
            project_name,
            inactive
        );
    }
    project
        .groups
        .keys()
        .find(|name| **name != inactive)
        .cloned()
        .ok_or_else(|| anyhow!("project '{}': no group other than '{}'", project_name, inactive))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(doc: &str) -> Project {
        serde_yaml::from_str(doc).unwrap()
    }

    const TWO_GROUPS: &str = r#"
super: w0@h0
inactive: green
groups:
  blue:
    - id: w1@h1
  green:
    - id: w2@h2
"#;

    #[test]
    fn literal_inactive_is_returned_verbatim() {
        let project = project(TWO_GROUPS);
        assert_eq!(inactive_group("web", &project).unwrap(), "green");
    }

    #[test]
    fn active_flips_to_the_other_group() {
        let project = project(TWO_GROUPS);
        assert_eq!(active_group("web", &project).unwrap(), "blue");
    }

    #[test]
    fn active_requires_exactly_two_groups() {
        let doc = TWO_GROUPS.to_string() + "  red:\n    - id: w3@h3\n";
        let project = project(&doc);
        let err = active_group("web", &project).unwrap_err();
        assert!(err.to_string().contains("exactly two groups"));
    }

    #[test]
    fn active_rejects_an_unconfigured_inactive_name() {
        let doc = TWO_GROUPS.replace("inactive: green", "inactive: purple");
        let project = project(&doc);
        let err = active_group("web", &project).unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn unconfigured_resolver_is_fatal() {
        let doc = TWO_GROUPS.replace("inactive: green\n", "");
        let project = project(&doc);
        assert!(inactive_group("web", &project).is_err());
    }

    #[test]
    fn url_detection() {
        assert!(is_url("http://example.net/tail"));
        assert!(is_url("https://example.net/tail"));
        assert!(!is_url("green"));
        assert!(!is_url("httpd"));
    }
}
