use std::{
    ffi::OsString,
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use tokio::process::Command;

use crate::{
    args,
    service::{Program, Service},
};

pub(crate) const ENGINE_ENV: &str = "XRAY_ENGINE";

#[cfg(windows)]
const ENGINE_FILE_NAME: &str = "xray.exe";
#[cfg(not(windows))]
const ENGINE_FILE_NAME: &str = "xray";

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct EngineConfig {
    pub executable: PathBuf,
}

impl EngineConfig {
    pub(crate) fn from_env() -> Self {
        Self::resolve(std::env::var_os(ENGINE_ENV), std::env::current_exe().ok())
    }

    fn resolve(explicit: Option<OsString>, current_exe: Option<PathBuf>) -> Self {
        if let Some(executable) = explicit.filter(|value| !value.is_empty()) {
            return Self {
                executable: executable.into(),
            };
        }

        let sibling = current_exe.as_deref().and_then(|current| {
            let candidate = current.parent()?.join(ENGINE_FILE_NAME);
            (candidate.is_file() && candidate != current).then_some(candidate)
        });

        Self {
            executable: sibling.unwrap_or_else(|| PathBuf::from(ENGINE_FILE_NAME)),
        }
    }
}

pub(crate) trait Dispatcher: Send + Sync + 'static {
    /// `args[0]` is the program name. Resolves to the engine's exit code.
    fn execute(&self, args: Vec<String>) -> impl Future<Output = anyhow::Result<i32>> + Send;
}

#[derive(Debug)]
pub(crate) struct EngineDispatcher {
    config: EngineConfig,
}

impl EngineDispatcher {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn executable(&self) -> &Path {
        &self.config.executable
    }
}

impl Dispatcher for EngineDispatcher {
    async fn execute(&self, args: Vec<String>) -> anyhow::Result<i32> {
        tracing::debug!(engine = %self.executable().display(), ?args, "Spawning engine");

        let mut child = Command::new(self.executable())
            .args(args.iter().skip(1))
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.executable().display()))?;

        let status = child.wait().await?;

        match status.code() {
            Some(code) => Ok(code),
            None => {
                tracing::warn!(%status, "Engine terminated without an exit code");
                Ok(1)
            }
        }
    }
}

pub(crate) async fn run_engine<D: Dispatcher>(dispatcher: &D, args: &[String]) -> i32 {
    let rewritten = args::v4_compatible(args);

    if args::is_legacy_run(args, &rewritten) {
        tracing::debug!("Compatible mode is deprecated, use `run [arguments]` instead");
    }

    match dispatcher.execute(rewritten).await {
        Ok(code) => {
            tracing::info!(code, "Engine exited");
            code
        }
        Err(e) => {
            tracing::error!("{e:#}");
            1
        }
    }
}

pub(crate) struct XrayProgram<D> {
    dispatcher: Arc<D>,
    args: Vec<String>,
}

impl<D: Dispatcher> XrayProgram<D> {
    pub(crate) fn new(dispatcher: D, args: Vec<String>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            args,
        }
    }
}

impl<D: Dispatcher> Program for XrayProgram<D> {
    fn start(&self, _service: &Service) -> anyhow::Result<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let args = self.args.clone();

        // Fire and forget. The task is never joined; when the engine exits,
        // so does the whole process, with the engine's exit code.
        tokio::spawn(async move {
            let code = run_engine(dispatcher.as_ref(), &args).await;
            std::process::exit(code);
        });

        Ok(())
    }

    fn stop(&self, _service: &Service) -> anyhow::Result<()> {
        Ok(())
    }
}
