//! Property-based tests for settings module
//!
//! These tests check properties that hold for every settings file the
//! manager may be given.

#[cfg(test)]
mod property_tests {
    use crate::settings::{Settings, SettingsManager, CAPTURE_FIFO_ENV, MODELS_DIR_ENV};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    /// Settings written to disk load back unchanged
    #[test]
    fn property_valid_settings_load_back() {
        proptest!(|(
            half_chunk in 1usize..=32768,
            capture_chunk_samples in 1usize..=16000,
            poll_interval_ms in 1u64..=1000,
            read_retries in 0u32..=10,
            retry_delay_ms in 0u64..=1000,
            engine_quiet in any::<bool>(),
            models in "[a-z]{1,12}"
        )| {
            let temp_dir = tempfile::tempdir().unwrap();
            let settings_path = temp_dir.path().join("settings.json");

            let settings = Settings {
                models_dir: temp_dir.path().join(&models),
                file_chunk_bytes: half_chunk * 2,
                capture_chunk_samples,
                poll_interval_ms,
                read_retries,
                retry_delay_ms,
                engine_quiet,
                ..Default::default()
            };
            let json = serde_json::to_string_pretty(&settings).unwrap();
            std::fs::write(&settings_path, json).unwrap();

            let manager = SettingsManager::load(settings_path, no_env).unwrap();
            prop_assert_eq!(manager.get(), settings);
        });
    }

    /// Retry delays pass validation up to ten seconds
    #[test]
    fn property_retry_delay_is_bounded() {
        proptest!(|(retry_delay_ms in 0u64..=100_000)| {
            let settings = Settings {
                retry_delay_ms,
                ..Default::default()
            };
            prop_assert_eq!(settings.validate().is_ok(), retry_delay_ms <= 10_000);
        });
    }

    /// Odd or too-small chunk sizes never pass validation
    #[test]
    fn property_odd_chunk_sizes_rejected() {
        proptest!(|(chunk in 0usize..=65535)| {
            let settings = Settings {
                file_chunk_bytes: chunk,
                ..Default::default()
            };
            let valid = chunk >= 2 && chunk % 2 == 0;
            prop_assert_eq!(settings.validate().is_ok(), valid);
        });
    }

    /// poll_interval_ms outside [1, 1000] is rejected
    #[test]
    fn property_poll_interval_range() {
        proptest!(|(poll in 0u64..=5000)| {
            let settings = Settings {
                poll_interval_ms: poll,
                ..Default::default()
            };
            let result = settings.validate();
            if (1..=1000).contains(&poll) {
                prop_assert!(result.is_ok());
            } else {
                prop_assert_eq!(result.unwrap_err().code(), "INVALID_SETTINGS");
            }
        });
    }

    #[test]
    fn test_missing_file_gives_defaults_and_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("nested").join("settings.json");

        let manager = SettingsManager::load(settings_path.clone(), no_env).unwrap();
        assert_eq!(manager.get(), Settings::default());
        assert_eq!(manager.settings_path(), settings_path.as_path());
        assert!(!settings_path.exists());
        assert!(!temp_dir.path().join("nested").exists());
    }

    #[test]
    fn test_invalid_json_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        std::fs::write(&settings_path, "{ not json").unwrap();

        let manager = SettingsManager::load(settings_path.clone(), no_env).unwrap();
        assert_eq!(manager.get(), Settings::default());
        // The broken file is left alone
        assert_eq!(std::fs::read_to_string(&settings_path).unwrap(), "{ not json");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        std::fs::write(
            &settings_path,
            r#"{ "poll_interval_ms": 20, "engine_quiet": false }"#,
        )
        .unwrap();

        let loaded = SettingsManager::load(settings_path, no_env).unwrap().get();
        assert_eq!(loaded.poll_interval_ms, 20);
        assert!(!loaded.engine_quiet);
        assert_eq!(loaded.file_chunk_bytes, 4096);
        assert_eq!(loaded.capture_chunk_samples, 3200);
        assert_eq!(loaded.log_filter, "vosk_session=info");
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        std::fs::write(&settings_path, r#"{ "file_chunk_bytes": 4095 }"#).unwrap();

        let err = SettingsManager::load(settings_path, no_env).err().unwrap();
        assert_eq!(err.code(), "INVALID_SETTINGS");
        assert!(err.to_string().contains("4095"));
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let settings_path = temp_dir.path().join("settings.json");
        std::fs::write(&settings_path, r#"{ "models_dir": "/from/file" }"#).unwrap();

        let env = |key: &str| match key {
            MODELS_DIR_ENV => Some("/from/env".to_string()),
            CAPTURE_FIFO_ENV => Some("  ".to_string()),
            _ => None,
        };
        let loaded = SettingsManager::load(settings_path, env).unwrap().get();
        assert_eq!(loaded.models_dir, PathBuf::from("/from/env"));
        // Blank values are ignored
        assert_eq!(loaded.capture_fifo, Settings::default().capture_fifo);
    }
}
