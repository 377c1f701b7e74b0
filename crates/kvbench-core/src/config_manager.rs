//! 설정 파일 관리.
//!
//! JSON 설정 파일 + `KVBENCH__` 접두사 환경변수를 `config` crate로 병합해 로드하고,
//! 갱신된 설정을 JSON 파일로 저장한다.

use crate::config::AppConfig;
use crate::error::CoreError;
use directories::ProjectDirs;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 설정 파일 이름
const CONFIG_FILE_NAME: &str = "config.json";

/// 환경변수 접두사 (예: `KVBENCH__BENCHMARK__MAX_SAMPLES=500`)
const ENV_PREFIX: &str = "KVBENCH";

/// 설정 관리자
///
/// 설정 파일의 로드/저장 및 런타임 설정 변경을 관리한다.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 현재 설정 (스레드 안전)
    config: Arc<RwLock<AppConfig>>,
    /// 설정 파일 경로
    config_path: PathBuf,
}

impl ConfigManager {
    /// 플랫폼 기본 경로에서 설정 관리자 생성
    pub fn new() -> Result<Self, CoreError> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// 지정된 경로로 설정 관리자 생성
    ///
    /// 파일이 없으면 기본값 + 환경변수로 구성한다 (파일은 만들지 않음).
    pub fn with_path(config_path: PathBuf) -> Result<Self, CoreError> {
        let config = Self::load(&config_path)?;
        if config_path.exists() {
            info!("설정 파일 로드: {}", config_path.display());
        } else {
            debug!("설정 파일 없음, 기본값 사용: {}", config_path.display());
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// 파일(선택) + 환경변수에서 설정 로드
    pub fn load(path: &Path) -> Result<AppConfig, CoreError> {
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }

    /// 현재 설정 반환 (복제본)
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// 설정 업데이트 및 파일 저장
    pub fn update(&self, new_config: AppConfig) -> Result<(), CoreError> {
        Self::save_to_file(&self.config_path, &new_config)?;
        *self.config.write() = new_config;
        debug!("설정 저장 완료: {}", self.config_path.display());
        Ok(())
    }

    /// 설정 파일 경로 반환
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// 플랫폼별 기본 설정 파일 경로
    ///
    /// - Linux: `~/.config/kvbench/config.json`
    /// - macOS: `~/Library/Application Support/org.kvasir.kvbench/config.json`
    /// - Windows: `%APPDATA%\kvasir\kvbench\config\config.json`
    pub fn default_config_path() -> Result<PathBuf, CoreError> {
        let dirs = ProjectDirs::from("org", "kvasir", "kvbench")
            .ok_or_else(|| CoreError::Config("홈 디렉토리를 찾을 수 없습니다".to_string()))?;
        Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// JSON 파일로 저장 (상위 디렉토리 자동 생성)
    fn save_to_file(path: &Path, config: &AppConfig) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(config)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Transport;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("none.json")).unwrap();
        let config = manager.get();
        assert_eq!(config.benchmark.drain_timeout_secs, 15);
        assert!(!manager.config_path().exists());
    }

    #[test]
    fn loads_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "server": {"base_url": "http://kvasir:8080", "transport": "poll"},
                "benchmark": {"sensors": [{"id": "S1"}, {"id": "S2", "unit": "%"}], "interval_ms": 250}
            }"#,
        )
        .unwrap();

        let manager = ConfigManager::with_path(path).unwrap();
        let config = manager.get();
        assert_eq!(config.server.base_url, "http://kvasir:8080");
        assert_eq!(config.server.transport, Transport::Poll);
        assert_eq!(config.benchmark.sensors.len(), 2);
        assert_eq!(config.benchmark.sensors[1].unit, "%");
        assert_eq!(config.benchmark.interval_ms, 250);
        assert_eq!(config.benchmark.max_samples, 10_000);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let manager = ConfigManager::with_path(path.clone()).unwrap();

        let mut config = manager.get();
        config.benchmark.max_samples = 42;
        manager.update(config).unwrap();
        assert_eq!(manager.get().benchmark.max_samples, 42);
        assert!(path.exists());

        let reopened = ConfigManager::with_path(path).unwrap();
        assert_eq!(reopened.get().benchmark.max_samples, 42);
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let dir = TempDir::new().unwrap();
        // 상위 경로가 디렉토리가 아닌 파일이라 생성 불가
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let manager = ConfigManager::with_path(blocker.join("config.json")).unwrap();

        let before = manager.get();
        let mut changed = before.clone();
        changed.benchmark.max_samples = 7;
        let result = manager.update(changed);
        assert!(matches!(result, Err(CoreError::Io(_))));
        assert_eq!(manager.get(), before);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        let result = ConfigManager::with_path(path);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
