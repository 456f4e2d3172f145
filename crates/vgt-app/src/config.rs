// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};
use vgt_math::{SceneParams, Vec3};
use vgt_platform::WindowDesc;
use vgt_render::{PresentMode, RenderSettings, Step};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub width: u32,
    pub height: u32,
    /// Falls back to the step's title.
    pub title: Option<String>,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let desc = WindowDesc::default();
        WindowCfg {
            width: desc.width,
            height: desc.height,
            title: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    #[default]
    Fifo,
    Mailbox,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub present_mode: PresentModeCfg,
    pub frames_in_flight: usize,
    pub wait_for_present: bool,
    pub validation: bool,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let d = RenderSettings::default();
        RenderCfg {
            clear_color: d.clear_color,
            present_mode: PresentModeCfg::Fifo,
            frames_in_flight: d.frames_in_flight,
            wait_for_present: d.wait_for_present,
            validation: d.validation,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SceneCfg {
    pub eye: [f32; 3],
    pub center: [f32; 3],
    pub up: [f32; 3],
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub spin_speed: f32,
    pub light_dir: [f32; 3],
}

impl Default for SceneCfg {
    fn default() -> Self {
        let s = SceneParams::default();
        SceneCfg {
            eye: s.eye.to_array(),
            center: s.center.to_array(),
            up: s.up.to_array(),
            fov_y: s.fov_y,
            z_near: s.z_near,
            z_far: s.z_far,
            spin_speed: s.spin_speed,
            light_dir: s.light_dir.to_array(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub scene: SceneCfg,
}

impl AppCfg {
    pub fn window_desc(&self, step: Step) -> WindowDesc {
        WindowDesc {
            title: self
                .window
                .title
                .clone()
                .unwrap_or_else(|| step.title()),
            width: self.window.width,
            height: self.window.height,
        }
    }

    pub fn scene_params(&self) -> SceneParams {
        let s = &self.scene;
        SceneParams {
            eye: Vec3::from_array(s.eye),
            center: Vec3::from_array(s.center),
            up: Vec3::from_array(s.up),
            fov_y: s.fov_y,
            z_near: s.z_near,
            z_far: s.z_far,
            spin_speed: s.spin_speed,
            light_dir: Vec3::from_array(s.light_dir),
        }
    }

    /// `force_validation` comes from the command line and can only turn
    /// validation on.
    pub fn render_settings(&self, force_validation: bool) -> RenderSettings {
        let r = &self.render;
        RenderSettings {
            clear_color: r.clear_color,
            present_mode: match r.present_mode {
                PresentModeCfg::Fifo => PresentMode::Fifo,
                PresentModeCfg::Mailbox => PresentMode::Mailbox,
            },
            frames_in_flight: r.frames_in_flight.max(1),
            wait_for_present: r.wait_for_present,
            validation: r.validation || force_validation,
            scene: self.scene_params(),
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("config {} is malformed, using defaults: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => AppCfg::default(),
        Err(e) => {
            warn!("config {} unreadable, using defaults: {e}", path.display());
            AppCfg::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.render_settings(false), RenderSettings::default());
        assert_eq!(cfg.scene_params(), SceneParams::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [render]
            present_mode = "mailbox"
            frames_in_flight = 2

            [scene]
            spin_speed = 0.5
            "#,
        )
        .unwrap();

        let settings = cfg.render_settings(false);
        assert_eq!(settings.present_mode, PresentMode::Mailbox);
        assert_eq!(settings.frames_in_flight, 2);
        assert!(settings.wait_for_present);
        assert_eq!(settings.clear_color, RenderSettings::default().clear_color);
        assert_eq!(settings.scene.spin_speed, 0.5);
        assert_eq!(settings.scene.eye, SceneParams::default().eye);
        assert_eq!(cfg.window, WindowCfg::default());
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let cfg = parse_cfg("[render]\nframes_in_flight = 0\n").unwrap();
        assert_eq!(cfg.render_settings(false).frames_in_flight, 1);
    }

    #[test]
    fn cli_validation_overrides_config() {
        let cfg = AppCfg::default();
        assert!(!cfg.render_settings(false).validation);
        assert!(cfg.render_settings(true).validation);
    }

    #[test]
    fn window_title_defaults_to_step() {
        let mut cfg = AppCfg::default();
        assert_eq!(cfg.window_desc(Step::Triangle).title, Step::Triangle.title());

        cfg.window.title = Some("custom".into());
        let desc = cfg.window_desc(Step::Triangle);
        assert_eq!(desc.title, "custom");
        assert_eq!((desc.width, desc.height), (1280, 720));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_cfg("[render]\npresent_mode = \"immediate\"\n").is_err());
        assert!(parse_cfg("[window\nwidth = 3").is_err());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let cfg = load_cfg(Path::new("this/path/does/not/exist/vgt.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
