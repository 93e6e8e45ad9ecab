use anyhow::{Context, Result};
use chrono::Local;
use log::info;
use std::io::Write;

use crate::constants::META_DATE_FORMAT;
use crate::{remote, shell};

/// Timestamp for the `date:` field of a descriptor written now.
pub fn now_stamp() -> String {
    Local::now().format(META_DATE_FORMAT).to_string()
}

/// Render the descriptor dropped into each deployed jail. Field layout
/// is part of the tool's wire contract; consumers parse it as YAML.
pub fn render(
    project: &str,
    group: &str,
    info: Option<&str>,
    jail: &str,
    node: &str,
    date: &str,
) -> String {
    format!(
        "---\n\
         date:     {date}\n\
         group:    {group}\n\
         info:     {info}\n\
         jail:     {jail}\n\
         node:     {node}\n\
         project:  {project}\n",
        info = info.unwrap_or("~"),
    )
}

/// Stage the descriptor locally, push it into the jail's /tmp and move
/// it into place read-only, owned by root.
pub fn install(
    host: &str,
    rootdir: &str,
    meta_path: &str,
    content: &str,
    dry_run: bool,
) -> Result<()> {
    let destination = format!("{}{}", rootdir, meta_path);
    if dry_run {
        info!("[{}] would install meta file at {}", host, destination);
        return Ok(());
    }

    let staging = format!(
        "{}/tmp/deploy.meta.yml.{}.{}",
        rootdir,
        remote::username(),
        std::process::id()
    );
    let mut local = tempfile::NamedTempFile::new().context("failed to stage meta file locally")?;
    local
        .write_all(content.as_bytes())
        .context("failed to write staged meta file")?;
    remote::copy(host, local.path(), &staging)?;
    remote::run(
        host,
        &format!(
            "mv {staging} {dest} && chown 0:0 {dest} && chmod 444 {dest}",
            staging = shell::escape(&staging),
            dest = shell::escape(&destination),
        ),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_layout_is_stable() {
        let rendered = render(
            "web",
            "green",
            None,
            "w2",
            "n2.example.net",
            "2024-01-01 00:00:00",
        );
        assert_eq!(
            rendered,
            "---\n\
             date:     2024-01-01 00:00:00\n\
             group:    green\n\
             info:     ~\n\
             jail:     w2\n\
             node:     n2.example.net\n\
             project:  web\n"
        );
    }

    #[test]
    fn info_url_is_written_through() {
        let rendered = render(
            "web",
            "blue",
            Some("https://example.net/info"),
            "w1",
            "n1",
            "2024-01-01 00:00:00",
        );
        assert!(rendered.contains("info:     https://example.net/info\n"));
    }

    #[test]
    fn descriptor_parses_back_as_yaml() {
        #[derive(serde::Deserialize)]
        struct Doc {
            group: String,
            project: String,
        }
        let rendered = render("web", "green", None, "w2", "n2", "2024-01-01 00:00:00");
        let doc: Doc = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(doc.group, "green");
        assert_eq!(doc.project, "web");
    }
}
