use directories::ProjectDirs;
use serde::Deserialize;
use std::{
    env,
    path::PathBuf,
};

#[derive(Clone, Debug, Deserialize, Default)]
pub(super) struct AppConfig {
    #[serde(default)]
    #[expect(unused)]
    pub(super) config_dir: PathBuf,
}

const PROJECT_NAME: &str = "STATISTICS_DUMPER";

lazy_static::lazy_static! {
    static ref CONFIG_FOLDER: Option<PathBuf> = env::var(format!("{PROJECT_NAME}_CONFIG"))
        .ok()
        .map(PathBuf::from);
}

/// Where `config.yaml` is looked up when no `--config` is given.
pub fn get_config_dir() -> PathBuf {
    if let Some(dir) = CONFIG_FOLDER.clone() {
        dir
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("online", "statistics", "statistics-dumper")
}
