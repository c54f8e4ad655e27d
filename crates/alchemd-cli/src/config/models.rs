use alchemd::workflows::sandbox::SandboxConfig;
use std::path::PathBuf;

pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub steps: u64,
    pub checkpoint_path: Option<PathBuf>,
    pub resume_path: Option<PathBuf>,
    pub show_progress: bool,
}
