//! Encode command assembly.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use stillmotion_common::config::EngineConfig;
use stillmotion_common::error::{StillmotionError, StillmotionResult};
use stillmotion_model::{RenderSettings, PIXEL_FORMAT, VIDEO_BITRATE, VIDEO_FPS};

use crate::filter_graph::{FilterGraph, Port};

/// One still fed to the engine, looped for `hold_secs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputDirective {
    pub path: PathBuf,
    pub hold_secs: u32,
}

/// Which video codec the encode uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderSelection {
    pub hardware: bool,
    pub hardware_codec: String,
    pub software_codec: String,
}

impl EncoderSelection {
    pub fn codec(&self) -> &str {
        if self.hardware {
            &self.hardware_codec
        } else {
            &self.software_codec
        }
    }

    /// Same codecs with the hardware flag overridden.
    pub fn with_hardware(mut self, hardware: bool) -> Self {
        self.hardware = hardware;
        self
    }
}

impl Default for EncoderSelection {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EncoderSelection {
    fn from(config: &EngineConfig) -> Self {
        Self {
            hardware: config.hardware_encoder,
            hardware_codec: config.hardware_codec.clone(),
            software_codec: config.software_codec.clone(),
        }
    }
}

/// A fully specified engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeCommand {
    pub inputs: Vec<InputDirective>,
    pub filter_graph: String,
    pub map_label: String,
    pub codec: String,
    pub pixel_format: String,
    pub fps: u32,
    pub bitrate: String,
    pub overwrite: bool,
    pub output: PathBuf,
}

impl EncodeCommand {
    /// Argument vector, without the program name.
    ///
    /// Inputs come first, each as `-loop 1 -t <hold> -i <path>`, followed by
    /// the graph, stream mapping and output options.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.inputs.len() * 6 + 16);
        for input in &self.inputs {
            args.push("-loop".to_string());
            args.push("1".to_string());
            args.push("-t".to_string());
            args.push(input.hold_secs.to_string());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().into_owned());
        }

        args.push("-filter_complex".to_string());
        args.push(self.filter_graph.clone());
        args.push("-map".to_string());
        args.push(format!("[{}]", self.map_label));
        args.push("-c:v".to_string());
        args.push(self.codec.clone());
        args.push("-pix_fmt".to_string());
        args.push(self.pixel_format.clone());
        args.push("-r".to_string());
        args.push(self.fps.to_string());
        args.push("-b:v".to_string());
        args.push(self.bitrate.clone());
        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push(self.output.to_string_lossy().into_owned());
        args
    }

    /// Shell-quoted rendering for logs and dry runs.
    pub fn to_command_line(&self, program: &str) -> String {
        let mut line = shell_quote(program);
        for arg in self.to_args() {
            line.push(' ');
            line.push_str(&shell_quote(&arg));
        }
        line
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl fmt::Display for EncodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command_line("ffmpeg"))
    }
}

/// Build the invocation for staged images in selection order.
pub fn assemble(
    staged: &[PathBuf],
    graph: &FilterGraph,
    settings: &RenderSettings,
    encoder: &EncoderSelection,
    output: &Path,
) -> StillmotionResult<EncodeCommand> {
    if staged.is_empty() {
        return Err(StillmotionError::invalid_input("no staged images to encode"));
    }
    if staged.len() != graph.input_count() {
        return Err(StillmotionError::invalid_input(format!(
            "filter graph expects {} inputs but {} images were staged",
            graph.input_count(),
            staged.len()
        )));
    }

    let map_label = match graph.output() {
        Port::Link(name) => name.clone(),
        Port::Input(index) => {
            return Err(StillmotionError::unexpected(format!(
                "filter graph output is raw input {index}"
            )))
        }
    };

    let hold_secs = settings.image_duration.secs();
    Ok(EncodeCommand {
        inputs: staged
            .iter()
            .map(|path| InputDirective {
                path: path.clone(),
                hold_secs,
            })
            .collect(),
        filter_graph: graph.to_string(),
        map_label,
        codec: encoder.codec().to_string(),
        pixel_format: PIXEL_FORMAT.to_string(),
        fps: VIDEO_FPS,
        bitrate: VIDEO_BITRATE.to_string(),
        overwrite: true,
        output: output.to_path_buf(),
    })
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r#"'\''"#))
    }
}
