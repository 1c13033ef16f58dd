//! 查看器配置：默认值，加上 `.env` / 环境变量覆盖。

use std::path::PathBuf;
use std::str::FromStr;

use log::warn;

use crate::page::ZoomPolicy;

pub const ENV_MIN_SCALE: &str = "RVIEWER_MIN_SCALE";
pub const ENV_MAX_SCALE: &str = "RVIEWER_MAX_SCALE";
pub const ENV_DOUBLE_TAP_SCALE: &str = "RVIEWER_DOUBLE_TAP_SCALE";
pub const ENV_RENDER_FACTOR: &str = "RVIEWER_RENDER_FACTOR";
pub const ENV_CACHE_CAPACITY: &str = "RVIEWER_CACHE_CAPACITY";
pub const ENV_DEFAULT_ASSET: &str = "RVIEWER_DEFAULT_ASSET";
pub const ENV_ASSET_DIR: &str = "RVIEWER_ASSET_DIR";
pub const ENV_CACHE_DIR: &str = "RVIEWER_CACHE_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    pub double_tap_scale: f32,
    /// 渲染过采样倍数，保证高像素密度和放大后依然清晰
    pub base_render_factor: f32,
    pub cache_capacity: usize,
    pub default_asset: String,
    pub asset_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.5,
            max_scale: 5.0,
            double_tap_scale: 2.0,
            base_render_factor: 4.0,
            cache_capacity: 1,
            default_asset: "sample.pdf".to_string(),
            asset_dir: PathBuf::from("assets"),
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("rviewer"),
        }
    }
}

impl ViewerConfig {
    /// 读取 `.env`（如果存在）和 `RVIEWER_*` 环境变量
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        override_from_env(ENV_MIN_SCALE, &mut config.min_scale);
        override_from_env(ENV_MAX_SCALE, &mut config.max_scale);
        override_from_env(ENV_DOUBLE_TAP_SCALE, &mut config.double_tap_scale);
        override_from_env(ENV_RENDER_FACTOR, &mut config.base_render_factor);
        override_from_env(ENV_CACHE_CAPACITY, &mut config.cache_capacity);
        override_from_env(ENV_DEFAULT_ASSET, &mut config.default_asset);
        override_from_env(ENV_ASSET_DIR, &mut config.asset_dir);
        override_from_env(ENV_CACHE_DIR, &mut config.cache_dir);
        config.normalize();
        config
    }

    pub fn normalize(&mut self) {
        if !self.min_scale.is_finite() || self.min_scale <= 0.0 {
            self.min_scale = 0.5;
        }
        self.min_scale = self.min_scale.min(1.0);

        if !self.max_scale.is_finite() {
            self.max_scale = 5.0;
        }
        self.max_scale = self.max_scale.max(1.0);

        if !self.double_tap_scale.is_finite() {
            self.double_tap_scale = 2.0;
        }
        self.double_tap_scale = self.double_tap_scale.clamp(self.min_scale, self.max_scale);

        if !self.base_render_factor.is_finite() {
            self.base_render_factor = 4.0;
        }
        self.base_render_factor = self.base_render_factor.clamp(1.0, 8.0);

        self.cache_capacity = self.cache_capacity.max(1);
        self.default_asset = self.default_asset.trim().to_string();
    }

    pub fn zoom_policy(&self) -> ZoomPolicy {
        ZoomPolicy {
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            double_tap_scale: self.double_tap_scale,
            base_render_factor: self.base_render_factor,
        }
    }
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => warn!("[Config] Ignoring unparsable {}={:?}", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            ENV_MIN_SCALE,
            ENV_MAX_SCALE,
            ENV_DOUBLE_TAP_SCALE,
            ENV_RENDER_FACTOR,
            ENV_CACHE_CAPACITY,
            ENV_DEFAULT_ASSET,
            ENV_ASSET_DIR,
            ENV_CACHE_DIR,
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn defaults_match_policy() {
        let config = ViewerConfig::default();
        let policy = config.zoom_policy();
        assert_eq!(policy.min_scale, 0.5);
        assert_eq!(policy.max_scale, 5.0);
        assert_eq!(policy.double_tap_scale, 2.0);
        assert!((3.0..=6.0).contains(&policy.base_render_factor));
        assert_eq!(config.cache_capacity, 1);
    }

    #[test]
    fn normalize_repairs_nonsense() {
        let mut config = ViewerConfig {
            min_scale: -1.0,
            max_scale: 0.2,
            double_tap_scale: 40.0,
            base_render_factor: f32::NAN,
            cache_capacity: 0,
            default_asset: "  sample.pdf ".to_string(),
            ..ViewerConfig::default()
        };
        config.normalize();
        assert_eq!(config.min_scale, 0.5);
        assert_eq!(config.max_scale, 1.0);
        assert_eq!(config.double_tap_scale, 1.0);
        assert_eq!(config.base_render_factor, 4.0);
        assert_eq!(config.cache_capacity, 1);
        assert_eq!(config.default_asset, "sample.pdf");
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        clear_env();
        std::env::set_var(ENV_MAX_SCALE, "8");
        std::env::set_var(ENV_CACHE_CAPACITY, "4");
        std::env::set_var(ENV_CACHE_DIR, "/tmp/rviewer-test-cache");

        let config = ViewerConfig::from_env();
        assert_eq!(config.max_scale, 8.0);
        assert_eq!(config.cache_capacity, 4);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/rviewer-test-cache"));
        clear_env();
    }

    #[test]
    #[serial]
    fn unparsable_env_values_are_ignored() {
        clear_env();
        std::env::set_var(ENV_MIN_SCALE, "tiny");
        std::env::set_var(ENV_RENDER_FACTOR, "5");

        let config = ViewerConfig::from_env();
        assert_eq!(config.min_scale, 0.5);
        assert_eq!(config.base_render_factor, 5.0);
        clear_env();
    }
}
