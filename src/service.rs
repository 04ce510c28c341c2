use std::future::Future;

use crate::args::ControlAction;

pub(crate) const SERVICE_NAME: &str = "XrayService";
pub(crate) const SERVICE_DISPLAY_NAME: &str = "Xray Proxy Service";
pub(crate) const SERVICE_DESCRIPTION: &str = "This service manages the Xray proxy platform.";

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ServiceConfig {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub arguments: Vec<String>,
}

impl ServiceConfig {
    pub(crate) fn xray(arguments: Vec<String>) -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            display_name: SERVICE_DISPLAY_NAME.to_string(),
            description: SERVICE_DESCRIPTION.to_string(),
            arguments,
        }
    }
}

/// `start` must not block; long running work belongs in a spawned task.
pub(crate) trait Program {
    fn start(&self, service: &Service) -> anyhow::Result<()>;
    fn stop(&self, service: &Service) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub(crate) struct Service {
    config: ServiceConfig,
}

impl Service {
    pub(crate) fn new(config: ServiceConfig) -> anyhow::Result<Self> {
        if config.name.is_empty() {
            anyhow::bail!("Service name must not be empty");
        }

        if config
            .name
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            anyhow::bail!("Invalid service name {:?}", config.name);
        }

        Ok(Self { config })
    }

    pub(crate) fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub(crate) fn unit_name(&self) -> String {
        format!("{}.service", self.config.name)
    }

    pub(crate) async fn run<P: Program>(&self, program: &P) -> anyhow::Result<()> {
        self.run_until(program, wait_for_shutdown()).await
    }

    async fn run_until<P, F>(&self, program: &P, shutdown: F) -> anyhow::Result<()>
    where
        P: Program,
        F: Future<Output = anyhow::Result<()>>,
    {
        tracing::info!(service = %self.config.name, "Starting {}", self.config.display_name);
        program.start(self)?;

        shutdown.await?;

        tracing::info!(service = %self.config.name, "Stopping {}", self.config.display_name);
        program.stop(self)
    }
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

pub(crate) trait ServiceManager {
    fn install(&self, service: &Service) -> anyhow::Result<()>;
    fn uninstall(&self, service: &Service) -> anyhow::Result<()>;
    fn start(&self, service: &Service) -> anyhow::Result<()>;
    fn stop(&self, service: &Service) -> anyhow::Result<()>;
    fn restart(&self, service: &Service) -> anyhow::Result<()>;
}

pub(crate) fn control<M: ServiceManager>(
    manager: &M,
    service: &Service,
    action: ControlAction,
) -> anyhow::Result<()> {
    match action {
        ControlAction::Install => manager.install(service),
        ControlAction::Uninstall => manager.uninstall(service),
        ControlAction::Start => manager.start(service),
        ControlAction::Stop => manager.stop(service),
        ControlAction::Restart => manager.restart(service),
    }
}
