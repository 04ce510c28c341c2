#![cfg_attr(not(target_os = "linux"), allow(dead_code))]

use std::path::{Path, PathBuf};

use anyhow::Context;
use rust_embed::Embed;

use crate::service::{Service, ServiceConfig, ServiceManager};

const UNIT_DIRECTORY: &str = "/etc/systemd/system";
const UNIT_TEMPLATE: &str = "service.unit";

#[derive(Embed)]
#[folder = "assets"]
struct Assets;

/// Quotes a single `ExecStart` word so systemd hands it over untouched.
fn quote_exec_arg(arg: &str) -> String {
    let escaped = arg.replace('%', "%%").replace('$', "$$");

    let needs_quotes = escaped.is_empty()
        || escaped
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | ';'));

    if !needs_quotes {
        return escaped;
    }

    format!(
        "\"{}\"",
        escaped.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

fn render_unit(config: &ServiceConfig, executable: &str) -> anyhow::Result<String> {
    let template = Assets::get(UNIT_TEMPLATE).context("Missing embedded unit template")?;
    let template = std::str::from_utf8(&template.data).context("Unit template is not UTF-8")?;

    let exec_start = std::iter::once(executable)
        .chain(config.arguments.iter().map(String::as_str))
        .map(quote_exec_arg)
        .collect::<Vec<_>>()
        .join(" ");

    Ok(template
        .replace("{description}", &config.description)
        .replace("{exec_start}", &exec_start))
}

fn write_unit(directory: &Path, unit_name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let unit_path = directory.join(unit_name);

    if unit_path.exists() {
        anyhow::bail!("Service {unit_name} is already installed at {}", unit_path.display());
    }

    std::fs::write(&unit_path, contents)
        .with_context(|| format!("Failed to write {}", unit_path.display()))?;

    Ok(unit_path)
}

fn installed_unit(directory: &Path, unit_name: &str) -> anyhow::Result<PathBuf> {
    let unit_path = directory.join(unit_name);

    if !unit_path.exists() {
        anyhow::bail!("Service {unit_name} is not installed");
    }

    Ok(unit_path)
}

fn remove_unit(unit_path: &Path) -> anyhow::Result<()> {
    std::fs::remove_file(unit_path)
        .with_context(|| format!("Failed to remove {}", unit_path.display()))
}

#[cfg(target_os = "linux")]
fn ensure_root() -> anyhow::Result<()> {
    if !nix::unistd::Uid::effective().is_root() {
        anyhow::bail!("You must run this executable with root permissions");
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn systemctl(verb: &str, unit_name: &str) -> anyhow::Result<()> {
    let mut command = std::process::Command::new("systemctl");
    command.arg(verb);

    if !unit_name.is_empty() {
        command.arg(unit_name);
    }

    tracing::debug!(?command, "Running systemctl");

    let status = command
        .status()
        .with_context(|| format!("Failed to run systemctl {verb}"))?;

    if !status.success() {
        anyhow::bail!("systemctl {verb} {unit_name} failed: {status}");
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn install_systemd_service(service: &Service) -> anyhow::Result<()> {
    ensure_root()?;

    let executable = std::env::current_exe()?;
    let executable_location = executable.to_str().context("Invalid executable path")?;

    let unit_name = service.unit_name();
    let unit_file = render_unit(service.config(), executable_location)?;
    let unit_path = write_unit(Path::new(UNIT_DIRECTORY), &unit_name, &unit_file)?;

    tracing::info!(path = %unit_path.display(), "Wrote unit file");

    systemctl("daemon-reload", "")?;
    systemctl("enable", &unit_name)?;

    Ok(())
}

#[cfg(target_os = "linux")]
fn uninstall_systemd_service(service: &Service) -> anyhow::Result<()> {
    ensure_root()?;

    let unit_name = service.unit_name();
    let unit_path = installed_unit(Path::new(UNIT_DIRECTORY), &unit_name)?;

    if let Err(e) = systemctl("stop", &unit_name) {
        tracing::warn!("{e:#}");
    }

    systemctl("disable", &unit_name)?;

    remove_unit(&unit_path)?;
    tracing::info!(path = %unit_path.display(), "Removed unit file");

    systemctl("daemon-reload", "")
}

#[cfg(not(target_os = "linux"))]
fn systemctl(_verb: &str, _unit_name: &str) -> anyhow::Result<()> {
    anyhow::bail!("This command is only supported on Linux");
}

#[cfg(not(target_os = "linux"))]
fn install_systemd_service(_service: &Service) -> anyhow::Result<()> {
    anyhow::bail!("This command is only supported on Linux");
}

#[cfg(not(target_os = "linux"))]
fn uninstall_systemd_service(_service: &Service) -> anyhow::Result<()> {
    anyhow::bail!("This command is only supported on Linux");
}

pub(crate) struct Systemd;

impl ServiceManager for Systemd {
    fn install(&self, service: &Service) -> anyhow::Result<()> {
        install_systemd_service(service)
    }

    fn uninstall(&self, service: &Service) -> anyhow::Result<()> {
        uninstall_systemd_service(service)
    }

    fn start(&self, service: &Service) -> anyhow::Result<()> {
        systemctl("start", &service.unit_name())
    }

    fn stop(&self, service: &Service) -> anyhow::Result<()> {
        systemctl("stop", &service.unit_name())
    }

    fn restart(&self, service: &Service) -> anyhow::Result<()> {
        systemctl("restart", &service.unit_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_are_not_quoted() {
        assert_eq!(quote_exec_arg("/usr/local/bin/xray"), "/usr/local/bin/xray");
        assert_eq!(quote_exec_arg("-config"), "-config");
    }

    #[test]
    fn awkward_words_are_quoted() {
        assert_eq!(quote_exec_arg("/opt/my xray/config.json"), "\"/opt/my xray/config.json\"");
        assert_eq!(quote_exec_arg(""), "\"\"");
        assert_eq!(quote_exec_arg("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(quote_exec_arg("C:\\xray"), "\"C:\\\\xray\"");
    }

    #[test]
    fn specifiers_and_variables_are_escaped() {
        assert_eq!(quote_exec_arg("100%"), "100%%");
        assert_eq!(quote_exec_arg("$HOME"), "$$HOME");
    }

    #[test]
    fn renders_unit() {
        let config = ServiceConfig::xray(vec![
            "-config".to_string(),
            "/etc/xray/config.json".to_string(),
        ]);

        let unit = render_unit(&config, "/usr/local/bin/xray-service").unwrap();

        assert!(unit.contains("Description=This service manages the Xray proxy platform.\n"));
        assert!(unit.contains(
            "ExecStart=/usr/local/bin/xray-service -config /etc/xray/config.json\n"
        ));
        assert!(unit.contains("WantedBy=multi-user.target"));
        assert!(!unit.contains('{'));
    }

    #[test]
    fn renders_unit_without_arguments() {
        let unit = render_unit(&ServiceConfig::xray(vec![]), "/usr/bin/xray-service").unwrap();
        assert!(unit.contains("ExecStart=/usr/bin/xray-service\n"));
    }

    #[test]
    fn writes_and_removes_unit() {
        let directory = tempfile::tempdir().unwrap();

        let path = write_unit(directory.path(), "XrayService.service", "[Unit]\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[Unit]\n");

        assert!(write_unit(directory.path(), "XrayService.service", "[Unit]\n").is_err());

        let installed = installed_unit(directory.path(), "XrayService.service").unwrap();
        assert_eq!(installed, path);

        remove_unit(&installed).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_unit_is_reported_as_not_installed() {
        let directory = tempfile::tempdir().unwrap();

        let error = installed_unit(directory.path(), "XrayService.service").unwrap_err();

        assert_eq!(error.to_string(), "Service XrayService.service is not installed");
    }
}
