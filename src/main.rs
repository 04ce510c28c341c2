mod args;
mod engine;
mod install;
mod logging;
mod service;

use std::process::ExitCode;

use args::Invocation;
use service::{Service, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init()?;

    let argv: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    match args::route(&argv) {
        Invocation::Control { action, arguments } => {
            let service = Service::new(ServiceConfig::xray(arguments))?;

            match service::control(&install::Systemd, &service, action) {
                Ok(()) => {
                    tracing::info!(service = %service.config().name, "{action} succeeded");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    tracing::error!(service = %service.config().name, "{action} failed: {e:#}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Invocation::Run => {
            let service = Service::new(ServiceConfig::xray(Vec::new()))?;

            let dispatcher = engine::EngineDispatcher::new(engine::EngineConfig::from_env());
            let program = engine::XrayProgram::new(dispatcher, argv);

            if let Err(e) = service.run(&program).await {
                tracing::error!("{e:#}");
            }

            Ok(ExitCode::SUCCESS)
        }
    }
}
