//! Typed filter graph construction.
//!
//! All three transition styles compile to the same topology:
//!
//! ```text
//! [0:v] ─ clip stages ─ [v0] ─┐
//!                             ├─ xfade ─ [xf1] ─┐
//! [1:v] ─ clip stages ─ [v1] ─┘                 ├─ xfade ─ [outv]
//! [2:v] ─ clip stages ─ [v2] ───────────────────┘
//! ```
//!
//! Styles differ only in the per-clip stages and the named transition. A
//! single still skips the transition chain and copies `[v0]` to `[outv]`.
//! The graph is plain data; [`FilterGraph`]'s `Display` impl produces the
//! engine's `-filter_complex` text.

use std::fmt;

use serde::Serialize;
use stillmotion_common::error::{StillmotionError, StillmotionResult};
use stillmotion_model::{
    ImageDuration, RenderSettings, TransitionStyle, TRANSITION_DURATION_SECS, VIDEO_FPS,
};

/// Label of the graph's single output port.
pub const OUTPUT_LINK: &str = "outv";

const KEN_BURNS_ZOOM_MIN: f64 = 1.0;
const KEN_BURNS_ZOOM_MAX: f64 = 1.2;
const KEN_BURNS_OVERSAMPLE: u32 = 2;

/// Directional styles used by the slide builder, indexed by `i mod 4`.
pub const SLIDE_CYCLE: [TransitionKind; 4] = [
    TransitionKind::SlideLeft,
    TransitionKind::SlideRight,
    TransitionKind::SlideUp,
    TransitionKind::SlideDown,
];

/// A connection point between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    /// Video stream of the n-th input directive.
    Input(usize),
    /// Named link between two nodes (or the graph output).
    Link(String),
}

impl Port {
    fn link(name: impl Into<String>) -> Self {
        Self::Link(name.into())
    }

    fn clip(index: usize) -> Self {
        Self::Link(format!("v{index}"))
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(index) => write!(f, "[{index}:v]"),
            Self::Link(name) => write!(f, "[{name}]"),
        }
    }
}

/// Pairwise transition effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Fade,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
}

impl TransitionKind {
    /// Name understood by the engine's `xfade` filter.
    pub fn xfade_name(self) -> &'static str {
        match self {
            Self::Fade => "fade",
            Self::SlideLeft => "slideleft",
            Self::SlideRight => "slideright",
            Self::SlideUp => "slideup",
            Self::SlideDown => "slidedown",
        }
    }
}

/// One processing step inside a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Stage {
    /// Shrink to fit inside the canvas, preserving aspect ratio.
    ScaleToFit { width: u32, height: u32 },
    /// Resize to an exact size.
    Scale { width: u32, height: u32 },
    /// Letterbox with black to exactly the canvas, centered.
    Pad { width: u32, height: u32 },
    /// Continuous zoom anchored at the frame center.
    ZoomPan {
        zoom_from: f64,
        zoom_to: f64,
        frames: u32,
        width: u32,
        height: u32,
        fps: u32,
    },
    /// Square sample aspect ratio.
    SetSar,
    /// Blend two inputs starting at `offset` seconds.
    Transition {
        kind: TransitionKind,
        duration: f64,
        offset: f64,
    },
    /// Pass the input through unchanged.
    Copy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScaleToFit { width, height } => {
                write!(f, "scale={width}:{height}:force_original_aspect_ratio=decrease")
            }
            Self::Scale { width, height } => write!(f, "scale={width}:{height}"),
            Self::Pad { width, height } => {
                write!(f, "pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black")
            }
            Self::ZoomPan {
                zoom_from,
                zoom_to,
                frames,
                width,
                height,
                fps,
            } => write!(
                f,
                "zoompan=z='{zoom_from}+({zoom_to}-{zoom_from})*on/{frames}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d={frames}:s={width}x{height}:fps={fps}"
            ),
            Self::SetSar => f.write_str("setsar=1"),
            Self::Transition {
                kind,
                duration,
                offset,
            } => write!(
                f,
                "xfade=transition={}:duration={duration}:offset={offset}",
                kind.xfade_name()
            ),
            Self::Copy => f.write_str("copy"),
        }
    }
}

/// What a node contributes to the composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeRole {
    /// Per-still preprocessing of input `index`.
    Clip { index: usize },
    /// The `index`-th pairwise transition (1-based).
    Transition { index: usize },
    /// Direct copy used when there is nothing to transition.
    Passthrough,
}

/// A linear chain of stages with explicit input and output ports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterNode {
    pub role: NodeRole,
    pub inputs: Vec<Port>,
    pub stages: Vec<Stage>,
    pub output: Port,
}

impl FilterNode {
    /// Transition stage carried by this node, if it is a transition.
    pub fn transition(&self) -> Option<(TransitionKind, f64, f64)> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Transition {
                kind,
                duration,
                offset,
            } => Some((*kind, *duration, *offset)),
            _ => None,
        })
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for input in &self.inputs {
            write!(f, "{input}")?;
        }
        for (idx, stage) in self.stages.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{stage}")?;
        }
        write!(f, "{}", self.output)
    }
}

/// A complete filter graph with exactly one designated output port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterGraph {
    nodes: Vec<FilterNode>,
    output: Port,
    input_count: usize,
}

impl FilterGraph {
    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    /// The designated output port, mapped to the encoded stream.
    pub fn output(&self) -> &Port {
        &self.output
    }

    /// Number of input streams the graph consumes.
    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn clip_nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.role, NodeRole::Clip { .. }))
    }

    pub fn transition_nodes(&self) -> impl Iterator<Item = &FilterNode> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.role, NodeRole::Transition { .. }))
    }

    /// Offsets of all transitions, in chain order.
    pub fn transition_offsets(&self) -> Vec<f64> {
        self.transition_nodes()
            .filter_map(|node| node.transition().map(|(_, _, offset)| offset))
            .collect()
    }

    /// The node that produces the designated output.
    pub fn output_node(&self) -> Option<&FilterNode> {
        self.nodes.iter().find(|node| node.output == self.output)
    }

    /// Check port wiring: every link consumed is produced exactly once
    /// earlier in the graph, and the output port has a single producer.
    pub fn validate(&self) -> StillmotionResult<()> {
        let mut produced: Vec<&Port> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            for input in &node.inputs {
                let known = match input {
                    Port::Input(index) => *index < self.input_count,
                    Port::Link(_) => produced.contains(&input),
                };
                if !known {
                    return Err(StillmotionError::unexpected(format!(
                        "filter graph consumes unknown port {input}"
                    )));
                }
            }
            if produced.contains(&&node.output) {
                return Err(StillmotionError::unexpected(format!(
                    "filter graph port {} is produced twice",
                    node.output
                )));
            }
            produced.push(&node.output);
        }

        match self.nodes.last() {
            Some(last) if last.output == self.output => Ok(()),
            _ => Err(StillmotionError::unexpected(
                "filter graph does not end at its output port",
            )),
        }
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, node) in self.nodes.iter().enumerate() {
            if idx > 0 {
                f.write_str(";")?;
            }
            write!(f, "{node}")?;
        }
        Ok(())
    }
}

/// Start time of the `i`-th transition (1-based), in seconds.
pub fn transition_offset(index: usize, image_secs: f64, transition_secs: f64) -> f64 {
    let i = index as f64;
    i * image_secs - i * transition_secs
}

/// Compiles slideshow parameters into a [`FilterGraph`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterGraphBuilder {
    width: u32,
    height: u32,
    image_secs: u32,
    style: TransitionStyle,
    fps: u32,
    transition_secs: f64,
}

impl FilterGraphBuilder {
    pub fn new(width: u32, height: u32, duration: ImageDuration, style: TransitionStyle) -> Self {
        Self {
            width,
            height,
            image_secs: duration.secs(),
            style,
            fps: VIDEO_FPS,
            transition_secs: TRANSITION_DURATION_SECS,
        }
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        let (width, height) = settings.resolution.dimensions();
        Self::new(width, height, settings.image_duration, settings.transition)
    }

    /// Build the graph for `image_count` stills in selection order.
    pub fn build(&self, image_count: usize) -> StillmotionResult<FilterGraph> {
        if image_count == 0 {
            return Err(StillmotionError::invalid_input(
                "a slideshow needs at least one image",
            ));
        }

        let mut nodes: Vec<FilterNode> = (0..image_count)
            .map(|index| FilterNode {
                role: NodeRole::Clip { index },
                inputs: vec![Port::Input(index)],
                stages: self.clip_stages(index),
                output: Port::clip(index),
            })
            .collect();

        let output = Port::link(OUTPUT_LINK);

        if image_count == 1 {
            nodes.push(FilterNode {
                role: NodeRole::Passthrough,
                inputs: vec![Port::clip(0)],
                stages: vec![Stage::Copy],
                output: output.clone(),
            });
        } else {
            let mut previous = Port::clip(0);
            for index in 1..image_count {
                let link = if index == image_count - 1 {
                    output.clone()
                } else {
                    Port::link(format!("xf{index}"))
                };
                nodes.push(FilterNode {
                    role: NodeRole::Transition { index },
                    inputs: vec![previous, Port::clip(index)],
                    stages: vec![Stage::Transition {
                        kind: self.transition_kind(index),
                        duration: self.transition_secs,
                        offset: transition_offset(
                            index,
                            self.image_secs as f64,
                            self.transition_secs,
                        ),
                    }],
                    output: link.clone(),
                });
                previous = link;
            }
        }

        tracing::debug!(
            style = %self.style,
            images = image_count,
            nodes = nodes.len(),
            "Filter graph built"
        );

        Ok(FilterGraph {
            nodes,
            output,
            input_count: image_count,
        })
    }

    fn clip_stages(&self, index: usize) -> Vec<Stage> {
        match self.style {
            TransitionStyle::Crossfade | TransitionStyle::Slide => vec![
                Stage::ScaleToFit {
                    width: self.width,
                    height: self.height,
                },
                Stage::Pad {
                    width: self.width,
                    height: self.height,
                },
                Stage::SetSar,
            ],
            TransitionStyle::KenBurns => {
                let (zoom_from, zoom_to) = if index % 2 == 0 {
                    (KEN_BURNS_ZOOM_MIN, KEN_BURNS_ZOOM_MAX)
                } else {
                    (KEN_BURNS_ZOOM_MAX, KEN_BURNS_ZOOM_MIN)
                };
                vec![
                    Stage::Scale {
                        width: self.width * KEN_BURNS_OVERSAMPLE,
                        height: self.height * KEN_BURNS_OVERSAMPLE,
                    },
                    Stage::ZoomPan {
                        zoom_from,
                        zoom_to,
                        frames: self.image_secs * self.fps,
                        width: self.width,
                        height: self.height,
                        fps: self.fps,
                    },
                    Stage::SetSar,
                ]
            }
        }
    }

    fn transition_kind(&self, index: usize) -> TransitionKind {
        match self.style {
            TransitionStyle::Crossfade | TransitionStyle::KenBurns => TransitionKind::Fade,
            TransitionStyle::Slide => SLIDE_CYCLE[index % SLIDE_CYCLE.len()],
        }
    }
}
