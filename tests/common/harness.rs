// Controller harness over the in-memory sandbox and a manual clock

use sandbox_ide::config::Config;
use sandbox_ide::services::sandbox::MemorySandbox;
use sandbox_ide::services::time_source::TestTimeSource;
use sandbox_ide::SessionController;
use std::sync::Arc;
use std::time::Duration;

pub const DEBOUNCE: Duration = Duration::from_millis(500);

pub struct Harness {
    pub sandbox: MemorySandbox,
    pub clock: Arc<TestTimeSource>,
    pub controller: SessionController,
}

/// Default configuration without the boot banner, so terminal assertions
/// start from an empty stream
pub fn quiet_config() -> Config {
    let mut config = Config::default();
    config.terminal.banner = false;
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(quiet_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_sandbox(MemorySandbox::new(), config)
    }

    pub fn with_sandbox(sandbox: MemorySandbox, config: Config) -> Self {
        super::tracing::init_tracing_from_env();
        let clock = Arc::new(TestTimeSource::new());
        let controller =
            SessionController::with_clock(Arc::new(sandbox.clone()), config, clock.clone());
        Self {
            sandbox,
            clock,
            controller,
        }
    }

    /// Harness with `files` mounted through the controller
    pub async fn with_project(files: &[(&str, &str)]) -> Self {
        let harness = Self::new();
        harness
            .controller
            .mount_project(files.iter().copied())
            .await
            .unwrap();
        harness
    }

    pub fn reads(&self, path: &str) -> usize {
        self.sandbox.metrics().read_calls(path)
    }

    pub fn writes(&self, path: &str) -> Vec<String> {
        self.sandbox
            .metrics()
            .writes_to(path)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn output(&self) -> String {
        self.controller.terminal_output()
    }

    /// Let spawned tasks (process watchers) run to completion
    pub async fn settle(&self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }
}
