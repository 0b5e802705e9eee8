//! Node configuration – reads/writes `~/.conenav/config.toml`.
//!
//! Every section falls back to its defaults field by field, so a config file
//! only needs to mention what it changes:
//!
//! ```toml
//! [planner]
//! max_speed = 0.8
//! track_cones = true
//!
//! [frames]
//! fixed_frame = "map"
//! ```
//!
//! Planner and detector parameters can also be changed while the node runs,
//! by name, through [`NavConfig::with_overrides`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use conenav_perception::{DetectorParams, MapParams};
use conenav_planner::PlannerParams;
use conenav_types::{NavError, ParamUpdate};

/// Frame names and transform lookup settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameParams {
    /// Frame cone detections are tracked in.
    pub fixed_frame: String,
    /// Longest wait for a transform, in seconds.
    pub transform_timeout: f64,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            fixed_frame: "odom".to_string(),
            transform_timeout: 0.5,
        }
    }
}

impl FrameParams {
    pub fn validate(&self) -> Result<(), NavError> {
        if self.fixed_frame.trim().is_empty() {
            return Err(NavError::InvalidParameter {
                name: "fixed_frame".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.transform_timeout.is_finite() && self.transform_timeout >= 0.0) {
            return Err(NavError::InvalidParameter {
                name: "transform_timeout".to_string(),
                reason: "must be a non-negative number of seconds".to_string(),
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.transform_timeout)
    }
}

/// Complete configuration of a navigation node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    pub planner: PlannerParams,
    pub detector: DetectorParams,
    pub map: MapParams,
    pub frames: FrameParams,
}

impl NavConfig {
    /// Check every section.
    pub fn validate(&self) -> Result<(), NavError> {
        self.planner.validate()?;
        self.detector.validate()?;
        self.map.validate()?;
        self.frames.validate()
    }

    /// A copy of this config with `updates` applied, validated as a whole.
    ///
    /// Names refer to planner or detector fields (`"max_speed"`,
    /// `"same_cone_threshold"`, ...). Map geometry and frames are fixed at
    /// startup. On any error `self` is untouched and nothing is applied.
    pub fn with_overrides(&self, updates: &[ParamUpdate]) -> Result<NavConfig, NavError> {
        let mut next = self.clone();
        for update in updates {
            if let Some(planner) = assign_field(&next.planner, update)? {
                next.planner = planner;
            } else if let Some(detector) = assign_field(&next.detector, update)? {
                next.detector = detector;
            } else {
                return Err(NavError::UnknownParameter(update.name.clone()));
            }
        }
        next.validate()?;
        Ok(next)
    }
}

/// Set the field named by `update` on a copy of `section`. `Ok(None)` when
/// the section has no such field.
fn assign_field<T>(section: &T, update: &ParamUpdate) -> Result<Option<T>, NavError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(section).map_err(|e| NavError::Parsing(e.to_string()))?;
    let Some(slot) = value.get_mut(&update.name) else {
        return Ok(None);
    };
    *slot = serde_json::to_value(update.value).map_err(|e| NavError::Parsing(e.to_string()))?;
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| NavError::InvalidParameter {
            name: update.name.clone(),
            reason: e.to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Files
// ─────────────────────────────────────────────────────────────────────────────

/// Return the path to `~/.conenav/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".conenav").join("config.toml")
}

/// Load the config from the default location. Returns `None` if the file
/// does not exist.
pub fn load() -> Result<Option<NavConfig>, NavError> {
    load_from(&config_path())
}

/// Load, apply environment overrides and validate the config at `path`.
pub fn load_from(path: &Path) -> Result<Option<NavConfig>, NavError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| NavError::Config(format!("failed to read config at {}: {e}", path.display())))?;
    let mut cfg: NavConfig =
        toml::from_str(&raw).map_err(|e| NavError::Parsing(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Save the config to `path`, creating parent directories as needed.
pub fn save_to(cfg: &NavConfig, path: &Path) -> Result<(), NavError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NavError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| NavError::Parsing(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| NavError::Config(format!("failed to write config at {}: {e}", path.display())))
}

/// Apply `CONENAV_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CONENAV_TRACK_CONES` | `planner.track_cones` |
/// | `CONENAV_MAX_SPEED` | `planner.max_speed` |
/// | `CONENAV_FIXED_FRAME` | `frames.fixed_frame` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut NavConfig) {
    apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut NavConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("CONENAV_TRACK_CONES")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.planner.track_cones = flag;
    }
    if let Some(v) = lookup("CONENAV_MAX_SPEED")
        && let Ok(speed) = v.trim().parse::<f64>()
        && speed.is_finite()
        && speed >= 0.0
    {
        cfg.planner.max_speed = speed;
    }
    if let Some(v) = lookup("CONENAV_FIXED_FRAME")
        && !v.trim().is_empty()
    {
        cfg.frames.fixed_frame = v.trim().to_string();
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conenav_types::ParamValue;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_values() {
        let cfg = NavConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.planner.min_radius, 0.695);
        assert_eq!(cfg.detector.same_cone_threshold, 0.3);
        assert_eq!(cfg.map.resolution, 0.10);
        assert_eq!(cfg.frames.fixed_frame, "odom");
        assert!((cfg.frames.timeout().as_secs_f64() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&NavConfig::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.planner, PlannerParams::default());
        assert_eq!(loaded.detector, DetectorParams::default());
        assert_eq!(loaded.map, MapParams::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nav.toml");
        fs::write(&path, "[planner]\ncone_speed = 0.25\n\n[detector]\nmin_circle_size = 6\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.planner.cone_speed, 0.25);
        assert_eq!(cfg.planner.max_radius, 4.0);
        assert_eq!(cfg.detector.min_circle_size, 6);
    }

    #[test]
    fn invalid_file_values_are_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("nav.toml");
        fs::write(&path, "[planner]\nmin_radius = 9.0\n").expect("write");
        assert!(matches!(load_from(&path), Err(NavError::InvalidParameter { .. })));

        fs::write(&path, "[planner\n").expect("write");
        assert!(matches!(load_from(&path), Err(NavError::Parsing(_))));
    }

    #[test]
    fn config_path_points_to_conenav_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".conenav"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = NavConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[
                ("CONENAV_TRACK_CONES", "true"),
                ("CONENAV_MAX_SPEED", "0.9"),
                ("CONENAV_FIXED_FRAME", "map"),
            ]),
        );
        assert!(cfg.planner.track_cones);
        assert_eq!(cfg.planner.max_speed, 0.9);
        assert_eq!(cfg.frames.fixed_frame, "map");
    }

    #[test]
    fn env_overrides_ignore_invalid_values() {
        let mut cfg = NavConfig::default();
        apply_overrides_from(
            &mut cfg,
            env(&[
                ("CONENAV_TRACK_CONES", "maybe"),
                ("CONENAV_MAX_SPEED", "fast"),
                ("CONENAV_FIXED_FRAME", "  "),
            ]),
        );
        assert_eq!(cfg, NavConfig::default());

        apply_overrides_from(&mut cfg, env(&[("CONENAV_MAX_SPEED", "-1")]));
        assert_eq!(cfg.planner.max_speed, 1.5);
    }

    #[test]
    fn overrides_apply_across_sections() {
        let cfg = NavConfig::default();
        let next = cfg
            .with_overrides(&[
                ParamUpdate::new("max_speed", ParamValue::Float(0.7)),
                ParamUpdate::new("track_cones", ParamValue::Bool(true)),
                ParamUpdate::new("backup_time", ParamValue::Int(4)),
                ParamUpdate::new("min_circle_size", ParamValue::Int(6)),
            ])
            .expect("valid batch");
        assert_eq!(next.planner.max_speed, 0.7);
        assert!(next.planner.track_cones);
        assert_eq!(next.planner.backup_time, 4.0);
        assert_eq!(next.detector.min_circle_size, 6);
        // The source is untouched.
        assert_eq!(cfg, NavConfig::default());
    }

    #[test]
    fn unknown_names_reject_the_whole_batch() {
        let cfg = NavConfig::default();
        let err = cfg
            .with_overrides(&[
                ParamUpdate::new("max_speed", ParamValue::Float(0.7)),
                ParamUpdate::new("warp_drive", ParamValue::Bool(true)),
            ])
            .unwrap_err();
        assert_eq!(err, NavError::UnknownParameter("warp_drive".to_string()));
    }

    #[test]
    fn mistyped_values_name_the_parameter() {
        let cfg = NavConfig::default();
        match cfg.with_overrides(&[ParamUpdate::new("max_speed", ParamValue::Bool(true))]) {
            Err(NavError::InvalidParameter { name, .. }) => assert_eq!(name, "max_speed"),
            other => panic!("unexpected {other:?}"),
        }
        match cfg.with_overrides(&[ParamUpdate::new("min_circle_size", ParamValue::Int(-2))]) {
            Err(NavError::InvalidParameter { name, .. }) => assert_eq!(name, "min_circle_size"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn batch_validated_as_a_whole() {
        let cfg = NavConfig::default();
        // Individually fine, jointly inconsistent.
        assert!(cfg
            .with_overrides(&[ParamUpdate::new("min_radius", ParamValue::Float(5.0))])
            .is_err());
        let next = cfg
            .with_overrides(&[
                ParamUpdate::new("min_radius", ParamValue::Float(5.0)),
                ParamUpdate::new("max_radius", ParamValue::Float(8.0)),
            ])
            .expect("consistent batch");
        assert_eq!(next.planner.min_radius, 5.0);
    }

    #[test]
    fn map_and_frames_are_not_live() {
        let cfg = NavConfig::default();
        for name in ["resolution", "fixed_frame"] {
            assert!(matches!(
                cfg.with_overrides(&[ParamUpdate::new(name, ParamValue::Float(1.0))]),
                Err(NavError::UnknownParameter(_))
            ));
        }
    }
}
