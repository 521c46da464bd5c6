use crate::modules::context::Initialize;
use crate::modules::settings::cli::SETTINGS;
use crate::{
    modules::error::{code::ErrorCode, RustScribeResult},
    raise_error,
};
use std::path::PathBuf;
use std::sync::LazyLock;

const TASKS_DIR: &str = "tasks";
const CACHE_DIR: &str = "cache";
const METADATA_CACHE_DIR: &str = "metadata";
const THUMBNAIL_CACHE_DIR: &str = "thumbnails";
const TEMP_DIR: &str = "temp";
const LOG_DIR: &str = "logs";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> =
    LazyLock::new(|| DataDirManager::new(PathBuf::from(&SETTINGS.rustscribe_root_dir)));

#[derive(Debug)]
pub struct DataDirManager {
    pub root_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub metadata_cache_dir: PathBuf,
    pub thumbnail_cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Initialize for DataDirManager {
    async fn initialize() -> RustScribeResult<()> {
        for dir in [
            &DATA_DIR_MANAGER.root_dir,
            &DATA_DIR_MANAGER.tasks_dir,
            &DATA_DIR_MANAGER.metadata_cache_dir,
            &DATA_DIR_MANAGER.thumbnail_cache_dir,
            &DATA_DIR_MANAGER.temp_dir,
            &DATA_DIR_MANAGER.log_dir,
        ] {
            std::fs::create_dir_all(dir)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        Ok(())
    }
}

impl DataDirManager {
    pub fn new(root_dir: PathBuf) -> Self {
        let cache_dir = root_dir.join(CACHE_DIR);
        Self {
            tasks_dir: root_dir.join(TASKS_DIR),
            metadata_cache_dir: cache_dir.join(METADATA_CACHE_DIR),
            thumbnail_cache_dir: cache_dir.join(THUMBNAIL_CACHE_DIR),
            temp_dir: root_dir.join(TEMP_DIR),
            log_dir: root_dir.join(LOG_DIR),
            cache_dir,
            root_dir,
        }
    }
}
